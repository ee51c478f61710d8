//! Mad-lib template generation
//!
//! Every generated template uses all 23 word slots once. Each blank is
//! written into the text as `[[<ID>::<slot>]]` and may appear more than once
//! (a name or place that recurs); every occurrence takes the same fill.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Word slot definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDef {
    pub slot: &'static str,
    pub prompt: &'static str,
    pub description: &'static str,
    pub example: &'static str,
}

/// All slots, in template order
pub const SLOTS: [SlotDef; 23] = [
    SlotDef { slot: "verb", prompt: "Verb", description: "Action word in present tense, something happening right now.", example: "sprint" },
    SlotDef { slot: "verb_past", prompt: "Verb (past tense)", description: "Action that already happened.", example: "hacked" },
    SlotDef { slot: "verb_ing", prompt: "Verb (ending in -ing)", description: "Action in progress or ongoing.", example: "glitching" },
    SlotDef { slot: "adjective", prompt: "Adjective", description: "Word that describes a noun.", example: "luminous" },
    SlotDef { slot: "adverb", prompt: "Adverb", description: "Word that describes how an action happens.", example: "urgently" },
    SlotDef { slot: "number", prompt: "Number", description: "Any number helps track scale or stakes.", example: "47" },
    SlotDef { slot: "exclamation", prompt: "Exclamation / Interjection", description: "A quick burst of feeling or surprise.", example: "Blast!" },
    SlotDef { slot: "animal", prompt: "Animal", description: "Any creature, real or imagined.", example: "manta ray" },
    SlotDef { slot: "color", prompt: "Color", description: "Shade, hue, or combination of colors.", example: "crimson" },
    SlotDef { slot: "body_part", prompt: "Body Part", description: "Part of a body or anatomy.", example: "left antenna" },
    SlotDef { slot: "place", prompt: "Place", description: "Location, setting, or realm.", example: "floating market" },
    SlotDef { slot: "person_name", prompt: "Person's Name", description: "Name, alias, or handle.", example: "Nova Vance" },
    SlotDef { slot: "occupation", prompt: "Occupation", description: "Job, role, or calling.", example: "timeline archivist" },
    SlotDef { slot: "emotion", prompt: "Emotion", description: "Feeling or mood.", example: "awe" },
    SlotDef { slot: "food", prompt: "Food", description: "Anything edible or tasty.", example: "starfruit tart" },
    SlotDef { slot: "liquid", prompt: "Liquid", description: "Any fluid, mundane or exotic.", example: "aurora syrup" },
    SlotDef { slot: "vehicle", prompt: "Vehicle", description: "Something used for transport.", example: "hoverbike" },
    SlotDef { slot: "celebrity", prompt: "Celebrity", description: "Famous person (real or in-universe).", example: "Celeste Halo" },
    SlotDef { slot: "object", prompt: "Object / Thing", description: "Physical item or artifact.", example: "quantum compass" },
    SlotDef { slot: "sound", prompt: "Sound / Noise", description: "Distinct noise, tone, or effect.", example: "static hiss" },
    SlotDef { slot: "relative", prompt: "Relative", description: "Family connection or chosen kin.", example: "great-aunt" },
    SlotDef { slot: "clothing", prompt: "Clothing Item", description: "Something someone can wear.", example: "gravity boots" },
    SlotDef { slot: "silly_word", prompt: "Silly Word", description: "Playful nonsense or made-up slang.", example: "zizzle" },
];

pub fn slot_def(slot: &str) -> Option<&'static SlotDef> {
    SLOTS.iter().find(|def| def.slot == slot)
}

/// Where the template text comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    #[default]
    Ai,
    Custom,
    Seed,
}

impl TemplateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateSource::Ai => "ai",
            TemplateSource::Custom => "custom",
            TemplateSource::Seed => "seed",
        }
    }

    /// Case-insensitive; anything unrecognized is `ai`
    pub fn normalize(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("custom") => TemplateSource::Custom,
            Some("seed") => TemplateSource::Seed,
            _ => TemplateSource::Ai,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateLength {
    #[default]
    Quick,
    Classic,
    Epic,
}

impl TemplateLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateLength::Quick => "quick",
            TemplateLength::Classic => "classic",
            TemplateLength::Epic => "epic",
        }
    }

    /// Case-insensitive; anything unrecognized is `quick`
    pub fn normalize(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("classic") => TemplateLength::Classic,
            Some("epic") => TemplateLength::Epic,
            _ => TemplateLength::Quick,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateOptions {
    pub genre: Option<String>,
    pub source: TemplateSource,
    pub length: TemplateLength,
    pub seed_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blank {
    pub id: String,
    pub slot: &'static str,
    pub prompt: &'static str,
    pub description: &'static str,
    pub example: &'static str,
}

impl Blank {
    pub fn placeholder(&self) -> String {
        format!("[[{}::{}]]", self.id.to_uppercase(), self.slot)
    }

    pub fn creative_nudge(&self) -> String {
        format!("{} Example: {}.", self.description, self.example)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub word_count: usize,
    pub blank_count: usize,
    pub tag_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTemplate {
    pub template: String,
    pub original_text: String,
    pub blanks: Vec<Blank>,
    pub metadata: TemplateMetadata,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[\[[^\]]+\]\]").expect("placeholder pattern is valid"))
}

fn blanks() -> Vec<Blank> {
    SLOTS
        .iter()
        .enumerate()
        .map(|(index, def)| Blank {
            id: format!("{}_{}", def.slot, index + 1),
            slot: def.slot,
            prompt: def.prompt,
            description: def.description,
            example: def.example,
        })
        .collect()
}

fn genre_intro(genre: &str, place: &str, person: &str, verb: &str, verb_ing: &str) -> String {
    let genre = genre.to_lowercase();
    if genre.contains("heist") {
        format!("In the neon glow of the {place}, {person} signals it's time to {verb}.")
    } else if genre.contains("fantasy") || genre.contains("myth") {
        format!("Legends whisper that {person} is {verb_ing} toward the {place} as destiny stirs.")
    } else if genre.contains("comedy") {
        format!("Somehow we ended up back at the {place}, where {person} tries to {verb} without laughing.")
    } else {
        format!("Inside the {place}, {person} cues the squad to {verb} before anyone hesitates.")
    }
}

/// Build a template using every slot once
pub fn generate_template(options: &TemplateOptions) -> GeneratedTemplate {
    let blanks = blanks();
    let ph = |slot: &str| {
        blanks
            .iter()
            .find(|b| b.slot == slot)
            .map(Blank::placeholder)
            .unwrap_or_default()
    };
    let (verb, verb_past, verb_ing) = (ph("verb"), ph("verb_past"), ph("verb_ing"));
    let (adjective, adverb, number) = (ph("adjective"), ph("adverb"), ph("number"));
    let (exclamation, animal, color) = (ph("exclamation"), ph("animal"), ph("color"));
    let (body_part, place, person) = (ph("body_part"), ph("place"), ph("person_name"));
    let (occupation, emotion, food) = (ph("occupation"), ph("emotion"), ph("food"));
    let (liquid, vehicle, celebrity) = (ph("liquid"), ph("vehicle"), ph("celebrity"));
    let (object, sound, relative) = (ph("object"), ph("sound"), ph("relative"));
    let (clothing, silly) = (ph("clothing"), ph("silly_word"));

    let mut segments = Vec::with_capacity(10);

    let seeded = matches!(options.source, TemplateSource::Seed | TemplateSource::Custom);
    if let Some(seed) = options.seed_text.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        if seeded {
            segments.push(seed.to_string());
        }
    }

    segments.push(genre_intro(
        options.genre.as_deref().unwrap_or("heist"),
        &place,
        &person,
        &verb,
        &verb_ing,
    ));
    segments.extend([
        format!("{exclamation}! We must {verb} the vault before the timer flashes {number} times."),
        format!("We already {verb_past} across the {place}, so {person}, our {occupation}, double-checks the {object}."),
        format!("Our {adjective} crew keeps {verb_ing} {adverb}, feeding off pure {emotion} to stay focused."),
        format!("A {color} {animal} bumps everyone's {body_part} for luck while passing around {food}."),
        format!("{person} tops off the {vehicle} with {liquid}, bragging that even {celebrity} approved of the recipe."),
        format!("A burst of {sound} from {relative}'s comm reminds us to pack the spare {clothing} labeled \"{silly}\"."),
    ]);

    if options.length != TemplateLength::Quick {
        segments.push(format!(
            "After the reveal, we keep {verb_ing} toward the {place} again, chanting {silly} in perfect {adverb} rhythm."
        ));
    }
    if options.length == TemplateLength::Epic {
        segments.push(format!(
            "By the time the {vehicle} lifts off, {relative} is humming along with the {sound} while {celebrity} streams the victory."
        ));
    }

    let template = segments.join(" ");
    let original_text = placeholder_pattern().replace_all(&template, "_____").into_owned();

    let mut tag_counts = BTreeMap::new();
    for blank in &blanks {
        *tag_counts.entry(blank.slot.to_string()).or_insert(0) += 1;
    }

    GeneratedTemplate {
        metadata: TemplateMetadata {
            word_count: original_text.split_whitespace().count(),
            blank_count: blanks.len(),
            tag_counts,
        },
        template,
        original_text,
        blanks,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Fixed, hand-written template offered in the template picker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub genre: &'static str,
    pub difficulty: Difficulty,
    pub min_age: u8,
    pub template: &'static str,
    pub blank_count: usize,
    pub estimated_time: &'static str,
    pub tags: &'static [&'static str],
}

struct PrebuiltSource {
    id: &'static str,
    title: &'static str,
    genre: &'static str,
    difficulty: Difficulty,
    min_age: u8,
    template: &'static str,
    estimated_time: &'static str,
    tags: &'static [&'static str],
}

const PREBUILT: &[PrebuiltSource] = &[
    PrebuiltSource {
        id: "magical-pet",
        title: "My Magical Pet",
        genre: "fantasy",
        difficulty: Difficulty::Easy,
        min_age: 7,
        template: "I have a magical [ANIMAL] named [NAME]. It can [VERB] through walls and loves to eat [FOOD]. Every [TIME OF DAY], we go on adventures to the [PLACE] where we search for [PLURAL NOUN]. My pet's favorite toy is a [ADJECTIVE] [OBJECT] that glows [COLOR] in the dark!",
        estimated_time: "5-10 min",
        tags: &["animals", "magic", "adventure", "kids"],
    },
    PrebuiltSource {
        id: "pizza-disaster",
        title: "The Great Pizza Disaster",
        genre: "comedy",
        difficulty: Difficulty::Easy,
        min_age: 7,
        template: "Yesterday, I tried to make a [ADJECTIVE] pizza with [TOPPING] and [TOPPING]. But when I opened the oven, the pizza had turned into a [CREATURE]! It started [VERB ENDING IN -ING] around the kitchen, throwing [PLURAL NOUN] everywhere. My [FAMILY MEMBER] screamed and hid under the [FURNITURE]!",
        estimated_time: "5-10 min",
        tags: &["food", "funny", "chaos", "family"],
    },
    PrebuiltSource {
        id: "big-game",
        title: "The Big Game",
        genre: "sports",
        difficulty: Difficulty::Easy,
        min_age: 7,
        template: "With [NUMBER] seconds left, [PLAYER NAME] grabbed the [SPORTS EQUIPMENT] and [PAST TENSE VERB] toward the goal. The crowd went [ADJECTIVE]! The other team's mascot, a giant [ANIMAL], started [VERB ENDING IN -ING] on the sidelines. We celebrated with [FOOD] and [BEVERAGE]!",
        estimated_time: "5-10 min",
        tags: &["sports", "team", "celebration"],
    },
    PrebuiltSource {
        id: "time-travel",
        title: "Time Travel Mishap",
        genre: "sci-fi",
        difficulty: Difficulty::Medium,
        min_age: 10,
        template: "I accidentally traveled to the year [YEAR] when my [ELECTRONIC DEVICE] malfunctioned. The first person I met was [HISTORICAL FIGURE] who was [VERB ENDING IN -ING] a [ADJECTIVE] [VEHICLE]. In this timeline, [PLURAL NOUN] rule the world and everyone must [VERB] three times a day. To get home, I need a [RARE OBJECT] hidden in the [LANDMARK].",
        estimated_time: "10-15 min",
        tags: &["time-travel", "sci-fi", "adventure", "history"],
    },
    PrebuiltSource {
        id: "fantasy-quest",
        title: "Epic Fantasy Quest",
        genre: "fantasy",
        difficulty: Difficulty::Medium,
        min_age: 10,
        template: "The prophecy speaks of a [ADJECTIVE] hero who will find the [MAGICAL OBJECT] of [ANCIENT NAME]. Armed with a [WEAPON] and joined by a [ADJECTIVE] [MYTHICAL CREATURE], you must cross the [TERRAIN] of [OMINOUS NAME]. The villain [VILLAIN NAME] has cursed the land with eternal [WEATHER CONDITION]. Only the power of [EMOTION] can break the spell.",
        estimated_time: "10-15 min",
        tags: &["fantasy", "quest", "magic"],
    },
    PrebuiltSource {
        id: "haunted-house",
        title: "The Haunted House",
        genre: "horror",
        difficulty: Difficulty::Medium,
        min_age: 13,
        template: "The old [LAST NAME] house has been empty since the [ADJECTIVE] incident of [YEAR]. Legend says if you say \"[PHRASE]\" three times in the [ROOM], the ghost of [NAME] appears holding a [OBJECT]. We found [PLURAL NOUN] arranged in a circle and heard [SOUND] coming from the [PART OF HOUSE].",
        estimated_time: "10-15 min",
        tags: &["horror", "ghost", "mystery"],
    },
    PrebuiltSource {
        id: "startup-pitch",
        title: "Startup Pitch",
        genre: "business",
        difficulty: Difficulty::Hard,
        min_age: 15,
        template: "Our startup, [COMPANY NAME], is the rideshare app of [INDUSTRY]. We use [BUZZWORD] technology to disrupt the [TRADITIONAL BUSINESS] industry. Our app connects [TYPE OF PERSON] with [TYPE OF PERSON] who need [SERVICE]. We're raising [DOLLAR AMOUNT] to scale our [ADJECTIVE] platform because we have [UNIQUE FEATURE].",
        estimated_time: "15-20 min",
        tags: &["business", "satire", "tech"],
    },
];

fn bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[[A-Z][^\]]*\]").expect("bracket pattern is valid"))
}

fn prebuilt(source: &PrebuiltSource) -> PrebuiltTemplate {
    PrebuiltTemplate {
        id: source.id,
        title: source.title,
        genre: source.genre,
        difficulty: source.difficulty,
        min_age: source.min_age,
        template: source.template,
        blank_count: bracket_pattern().find_iter(source.template).count(),
        estimated_time: source.estimated_time,
        tags: source.tags,
    }
}

/// Prebuilt catalog, optionally narrowed by difficulty and the player's age
pub fn prebuilt_templates(difficulty: Option<Difficulty>, age: Option<u8>) -> Vec<PrebuiltTemplate> {
    PREBUILT
        .iter()
        .filter(|t| difficulty.map_or(true, |d| t.difficulty == d))
        .filter(|t| age.map_or(true, |a| t.min_age <= a))
        .map(prebuilt)
        .collect()
}

pub fn prebuilt_template(id: &str) -> Option<PrebuiltTemplate> {
    PREBUILT.iter().find(|t| t.id == id).map(prebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_template_uses_every_slot() {
        let template = generate_template(&TemplateOptions::default());

        assert_eq!(template.blanks.len(), 23);
        assert_eq!(template.metadata.blank_count, 23);
        assert_eq!(template.blanks[0].id, "verb_1");
        assert_eq!(template.blanks[22].placeholder(), "[[SILLY_WORD_23::silly_word]]");
        for blank in &template.blanks {
            assert!(template.template.contains(&blank.placeholder()), "{} missing", blank.id);
        }
        assert!(!template.original_text.contains("[["));
        assert!(template.original_text.contains("_____"));
        assert!(template.template.starts_with("In the neon glow"));
    }

    #[test]
    fn test_length_adds_segments() {
        let count = |length| {
            generate_template(&TemplateOptions {
                length,
                ..Default::default()
            })
            .metadata
            .word_count
        };
        assert!(count(TemplateLength::Classic) > count(TemplateLength::Quick));
        assert!(count(TemplateLength::Epic) > count(TemplateLength::Classic));
    }

    #[test]
    fn test_genre_intro_and_seed() {
        let template = generate_template(&TemplateOptions {
            genre: Some("Dark Fantasy".into()),
            source: TemplateSource::Seed,
            seed_text: Some("  The bridge was out.  ".into()),
            ..Default::default()
        });
        assert!(template.template.starts_with("The bridge was out. Legends whisper"));

        let unseeded = generate_template(&TemplateOptions {
            genre: Some("comedy".into()),
            seed_text: Some("ignored for ai source".into()),
            ..Default::default()
        });
        assert!(unseeded.template.starts_with("Somehow we ended up"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(TemplateSource::normalize(Some("SEED")), TemplateSource::Seed);
        assert_eq!(TemplateSource::normalize(Some("other")), TemplateSource::Ai);
        assert_eq!(TemplateLength::normalize(Some("Epic")), TemplateLength::Epic);
        assert_eq!(TemplateLength::normalize(None), TemplateLength::Quick);
    }

    #[test]
    fn test_prebuilt_catalog() {
        let pet = prebuilt_template("magical-pet").unwrap();
        assert_eq!(pet.blank_count, 10);

        let easy = prebuilt_templates(Some(Difficulty::Easy), None);
        assert!(easy.iter().all(|t| t.difficulty == Difficulty::Easy));

        let kids = prebuilt_templates(None, Some(8));
        assert!(kids.iter().all(|t| t.min_age <= 8));
        assert!(kids.len() < prebuilt_templates(None, None).len());
    }
}
