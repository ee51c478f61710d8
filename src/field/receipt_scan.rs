//! Receipt text extraction
//!
//! Works on text the client already recognized; no image processing
//! happens here.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Expense cost code with its trigger keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostCode {
    pub code: &'static str,
    pub name: &'static str,
    #[serde(skip)]
    pub keywords: &'static [&'static str],
}

pub const COST_CODES: &[CostCode] = &[
    CostCode {
        code: "98-1300",
        name: "Meals",
        keywords: &["MEAL", "LUNCH", "DINNER", "BREAKFAST", "RESTAURANT", "FOOD"],
    },
    CostCode {
        code: "98-1500",
        name: "Lodging",
        keywords: &["HOTEL", "MOTEL", "LODGING", "INN", "SUITES"],
    },
    CostCode {
        code: "98-1650",
        name: "Ground Transportation",
        keywords: &["UBER", "LYFT", "TAXI", "CAB"],
    },
    CostCode {
        code: "98-2100",
        name: "Fuel",
        keywords: &["GAS", "FUEL", "DIESEL", "SHELL", "EXXON", "CHEVRON", "BP"],
    },
    CostCode {
        code: "98-4500",
        name: "Tools & Hardware",
        keywords: &["TOOLS", "HARDWARE", "HOME DEPOT", "LOWES", "ACE"],
    },
    CostCode {
        code: "98-6000",
        name: "Safety Supplies",
        keywords: &["SAFETY", "PPE", "GLOVES", "GLASSES", "FIRST AID"],
    },
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub items: Vec<String>,
    pub cost_code: Option<CostCode>,
}

struct Patterns {
    amounts: Vec<Regex>,
    dates: Vec<Regex>,
    numeric: Regex,
    month: Regex,
    trailing_price: Regex,
    keywords: Vec<(&'static CostCode, Regex)>,
}

const MONTH: &str = r"(Jan(uary)?|Feb(ruary)?|Mar(ch)?|Apr(il)?|May|June?|July?|Aug(ust)?|Sept?(ember)?|Oct(ober)?|Nov(ember)?|Dec(ember)?)";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("receipt pattern is valid")
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        amounts: [
            r"(?i)\bTOTAL[:\s]+\$?([\d,]+\.?\d*)",
            r"(?i)\bAMOUNT[:\s]+\$?([\d,]+\.?\d*)",
            r"(?i)\bSUBTOTAL[:\s]+\$?([\d,]+\.?\d*)",
            r"\$\s*([\d,]+\.?\d+)",
            r"(?i)USD\s*([\d,]+\.?\d+)",
        ]
        .iter()
        .map(|p| compile(p))
        .collect(),
        dates: [
            r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b".to_string(),
            r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b".to_string(),
            format!(r"(?i)\b{MONTH}\.?\s+\d{{1,2}},?\s+\d{{4}}"),
            format!(r"(?i)\b\d{{1,2}}\s+{MONTH}\.?\s+\d{{4}}"),
        ]
        .iter()
        .map(|p| compile(p))
        .collect(),
        numeric: compile(r"^[\d\s.,$-]+$"),
        month: compile(&format!(r"(?i)\b{MONTH}\b")),
        trailing_price: compile(r"\$?\s*\d[\d,]*\.\d{2}\s*$"),
        keywords: COST_CODES
            .iter()
            .flat_map(|code| {
                code.keywords
                    .iter()
                    .map(move |k| (code, compile(&format!(r"\b{}\b", regex::escape(k)))))
            })
            .collect(),
    })
}

fn looks_like_date(line: &str) -> bool {
    let p = patterns();
    p.dates.iter().any(|re| re.is_match(line)) || p.month.is_match(line)
}

fn is_total_line(line: &str) -> bool {
    let upper = line.to_uppercase();
    ["TOTAL", "TAX", "CHANGE", "BALANCE", "AMOUNT", "CASH", "VISA", "MASTERCARD"]
        .iter()
        .any(|word| upper.contains(word))
}

/// Pick the cost code for a receipt's text
///
/// An explicit code in the text wins; otherwise the first keyword hit in
/// table order.
pub fn match_cost_code(text: &str) -> Option<CostCode> {
    if let Some(code) = COST_CODES.iter().find(|c| text.contains(c.code)) {
        return Some(*code);
    }
    let upper = text.to_uppercase();
    patterns()
        .keywords
        .iter()
        .find(|(_, re)| re.is_match(&upper))
        .map(|(code, _)| **code)
}

pub fn scan_text(text: &str) -> ScanResult {
    let p = patterns();
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let vendor = lines
        .iter()
        .take(5)
        .find(|line| line.len() > 3 && !p.numeric.is_match(line) && !looks_like_date(line))
        .map(|line| line.to_string());

    let amount = p.amounts.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
    });

    let date = p
        .dates
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().to_string());

    let items = lines
        .iter()
        .filter(|line| line.len() > 5 && p.trailing_price.is_match(line) && !is_total_line(line))
        .map(|line| p.trailing_price.replace(line, "").trim().to_string())
        .filter(|item| item.len() > 2)
        .collect();

    ScanResult {
        vendor,
        amount,
        date,
        items,
        cost_code: match_cost_code(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "HOME DEPOT #4521
123 Industrial Way
03/14/2024

Wire Nuts 100pk          $12.97
Work Gloves              $24.99
Electrical Tape x3       $15.53

SUBTOTAL              $53.49
TAX                    $4.28
TOTAL                 $57.77";

    #[test]
    fn test_scan_sample_receipt() {
        let result = scan_text(SAMPLE);
        assert_eq!(result.vendor.as_deref(), Some("HOME DEPOT #4521"));
        assert_eq!(result.amount, Some(57.77));
        assert_eq!(result.date.as_deref(), Some("03/14/2024"));
        assert_eq!(
            result.items,
            vec!["Wire Nuts 100pk", "Work Gloves", "Electrical Tape x3"]
        );
        assert_eq!(result.cost_code.unwrap().code, "98-4500");
    }

    #[test]
    fn test_amount_fallbacks() {
        assert_eq!(scan_text("Coffee\nAmount: 4.50").amount, Some(4.5));
        assert_eq!(scan_text("Parking\nPaid $1,204.10").amount, Some(1204.1));
        assert_eq!(scan_text("Parking\nUSD 12.00").amount, Some(12.0));
        assert_eq!(scan_text("nothing to see").amount, None);
    }

    #[test]
    fn test_date_forms() {
        assert_eq!(scan_text("X\n2024-03-14").date.as_deref(), Some("2024-03-14"));
        assert_eq!(scan_text("X\nMar 14, 2024").date.as_deref(), Some("Mar 14, 2024"));
        assert_eq!(scan_text("X\n14 March 2024").date.as_deref(), Some("14 March 2024"));
    }

    #[test]
    fn test_vendor_skips_numbers_and_dates() {
        let result = scan_text("12345\n03/14/2024\nMarriott Suites\nTOTAL 210.00");
        assert_eq!(result.vendor.as_deref(), Some("Marriott Suites"));
        assert_eq!(result.cost_code.unwrap().code, "98-1500");
    }

    #[test]
    fn test_cost_code_keywords_are_whole_words() {
        assert_eq!(match_cost_code("Diner lunch special").unwrap().code, "98-1300");
        assert_eq!(match_cost_code("Uber trip").unwrap().code, "98-1650");
        assert_eq!(match_cost_code("Expense 98-6000 restock").unwrap().code, "98-6000");
        assert!(match_cost_code("BPX cabinet winner").is_none());
    }
}
