//! Database schema
//!
//! Every statement is idempotent so the migration runs on each open.

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    username TEXT COLLATE NOCASE UNIQUE,
    display_name TEXT,
    bio TEXT,
    avatar_url TEXT,
    email TEXT,
    phone TEXT,
    discord_handle TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS angry_lips_sessions (
    id TEXT PRIMARY KEY,
    host_id TEXT NOT NULL,
    title TEXT NOT NULL,
    genre TEXT,
    status TEXT NOT NULL,
    template_source TEXT NOT NULL,
    template_length TEXT NOT NULL,
    template_text TEXT NOT NULL,
    seed_text TEXT,
    response_window_minutes INTEGER NOT NULL,
    allow_ai_cohost INTEGER NOT NULL,
    vault_mode TEXT NOT NULL,
    timeout_strategy TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_created ON angry_lips_sessions(created_at);

CREATE TABLE IF NOT EXISTS angry_lips_participants (
    session_id TEXT NOT NULL REFERENCES angry_lips_sessions(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    status TEXT NOT NULL,
    handle TEXT,
    invited_at TEXT NOT NULL,
    responded_at TEXT,
    PRIMARY KEY (session_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_participants_user ON angry_lips_participants(user_id);

CREATE TABLE IF NOT EXISTS angry_lips_turns (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES angry_lips_sessions(id) ON DELETE CASCADE,
    order_index INTEGER NOT NULL,
    status TEXT NOT NULL,
    prompt TEXT NOT NULL,
    part_of_speech TEXT,
    creative_nudge TEXT,
    placeholder TEXT,
    assigned_user_id TEXT,
    assigned_handle TEXT,
    due_at TEXT,
    expires_at TEXT,
    submitted_text TEXT,
    submission_handle TEXT,
    submitted_at TEXT,
    auto_fill_text TEXT,
    auto_filled INTEGER NOT NULL DEFAULT 0,
    completed_by TEXT,
    notified_channels TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    UNIQUE (session_id, order_index)
);

CREATE TABLE IF NOT EXISTS angry_lips_turn_events (
    id TEXT PRIMARY KEY,
    turn_id TEXT NOT NULL REFERENCES angry_lips_turns(id) ON DELETE CASCADE,
    session_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_turn_events_turn ON angry_lips_turn_events(turn_id);

CREATE TABLE IF NOT EXISTS angry_lips_vault_entries (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL UNIQUE REFERENCES angry_lips_sessions(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    story_text TEXT NOT NULL,
    ai_story_text TEXT,
    summary_text TEXT,
    theme_prompt TEXT,
    visibility TEXT NOT NULL,
    published_at TEXT,
    published_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_accounts (
    user_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, currency)
);

CREATE TABLE IF NOT EXISTS ledger_transactions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    amount INTEGER NOT NULL,
    balance_after INTEGER NOT NULL,
    transaction_type TEXT NOT NULL,
    description TEXT,
    reference_id TEXT,
    feature TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_tx_user ON ledger_transactions(user_id, currency, created_at);

CREATE TABLE IF NOT EXISTS daily_bonus_claims (
    user_id TEXT NOT NULL,
    claim_date TEXT NOT NULL,
    amount INTEGER NOT NULL,
    PRIMARY KEY (user_id, claim_date)
);

CREATE TABLE IF NOT EXISTS spark_packages (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sparks_amount INTEGER NOT NULL,
    bonus_sparks INTEGER NOT NULL,
    price_cents INTEGER NOT NULL,
    popular INTEGER NOT NULL DEFAULT 0,
    best_value INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 1,
    display_order INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS subscription_tiers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    monthly_price_cents INTEGER NOT NULL,
    yearly_price_cents INTEGER NOT NULL,
    monthly_sparks INTEGER NOT NULL,
    features TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    display_order INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS spark_purchases (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    package_id TEXT NOT NULL REFERENCES spark_packages(id),
    sparks_amount INTEGER NOT NULL,
    bonus_amount INTEGER NOT NULL,
    total_sparks INTEGER NOT NULL,
    price_cents INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS user_subscriptions (
    user_id TEXT PRIMARY KEY,
    tier_id TEXT NOT NULL REFERENCES subscription_tiers(id),
    billing_period TEXT NOT NULL,
    status TEXT NOT NULL,
    current_period_start TEXT NOT NULL,
    current_period_end TEXT NOT NULL,
    cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS referral_rewards (
    referrer_id TEXT NOT NULL,
    referred_id TEXT NOT NULL,
    reward_type TEXT NOT NULL,
    amount INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (referrer_id, referred_id, reward_type)
);

CREATE TABLE IF NOT EXISTS bookworm_requests (
    id TEXT PRIMARY KEY,
    requester_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    created_at TEXT NOT NULL,
    responded_at TEXT,
    UNIQUE (requester_id, target_id)
);

CREATE TABLE IF NOT EXISTS bookworms (
    user_id TEXT NOT NULL,
    friend_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, friend_id)
);

CREATE TABLE IF NOT EXISTS feed_posts (
    id TEXT PRIMARY KEY,
    author_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    title TEXT,
    body TEXT NOT NULL,
    metadata TEXT NOT NULL,
    reference_id TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feed_posts_created ON feed_posts(created_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_feed_posts_reference
    ON feed_posts(event_type, reference_id) WHERE reference_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS feed_likes (
    post_id TEXT NOT NULL REFERENCES feed_posts(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (post_id, user_id)
);

CREATE TABLE IF NOT EXISTS feed_reposts (
    post_id TEXT NOT NULL REFERENCES feed_posts(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (post_id, user_id)
);

CREATE TABLE IF NOT EXISTS feed_comments (
    id TEXT PRIMARY KEY,
    post_id TEXT NOT NULL REFERENCES feed_posts(id) ON DELETE CASCADE,
    author_id TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feed_comments_post ON feed_comments(post_id, created_at);

CREATE TABLE IF NOT EXISTS receipts (
    id TEXT PRIMARY KEY,
    company_id TEXT NOT NULL,
    submitted_by TEXT NOT NULL,
    merchant_name TEXT NOT NULL,
    amount REAL NOT NULL,
    category TEXT NOT NULL,
    description TEXT,
    receipt_date TEXT NOT NULL,
    project_id TEXT,
    payment_method TEXT,
    status TEXT NOT NULL,
    image_data BLOB,
    image_content_type TEXT,
    reviewed_by TEXT,
    reviewed_at TEXT,
    review_notes TEXT,
    rejection_reason TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_receipts_company ON receipts(company_id, receipt_date);

CREATE TABLE IF NOT EXISTS daily_reports (
    id TEXT PRIMARY KEY,
    company_id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    foreman_id TEXT,
    report_date TEXT NOT NULL,
    shift TEXT NOT NULL,
    weather TEXT NOT NULL,
    production TEXT NOT NULL,
    crew TEXT NOT NULL,
    safety TEXT NOT NULL,
    notes TEXT NOT NULL,
    status TEXT NOT NULL,
    submitted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_daily_reports_company ON daily_reports(company_id, report_date);

CREATE TABLE IF NOT EXISTS arc_flash_studies (
    id TEXT PRIMARY KEY,
    company_id TEXT NOT NULL,
    equipment_id TEXT NOT NULL,
    equipment_name TEXT NOT NULL,
    inputs TEXT NOT NULL,
    results TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS switching_orders (
    id TEXT PRIMARY KEY,
    company_id TEXT NOT NULL,
    order_number TEXT NOT NULL,
    request_date TEXT NOT NULL,
    requested_by TEXT NOT NULL,
    affected_circuits TEXT NOT NULL,
    isolation_points TEXT NOT NULL,
    grounds TEXT NOT NULL,
    clearance_boundaries TEXT,
    special_conditions TEXT,
    outage_start TEXT,
    outage_end TEXT,
    test_before_touch INTEGER NOT NULL,
    status TEXT NOT NULL,
    approved_by TEXT,
    approved_at TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_switching_company ON switching_orders(company_id, created_at);
";

/// Catalog rows inserted once; existing ids are left untouched
pub(crate) const SEED: &str = "
INSERT OR IGNORE INTO spark_packages
    (id, name, sparks_amount, bonus_sparks, price_cents, popular, best_value, active, display_order)
VALUES
    ('starter', 'Starter Pouch', 100, 0, 99, 0, 0, 1, 1),
    ('explorer', 'Explorer Satchel', 500, 50, 499, 1, 0, 1, 2),
    ('adventurer', 'Adventurer Chest', 1200, 240, 999, 0, 1, 1, 3),
    ('legend', 'Legend Vault', 2500, 625, 1999, 0, 0, 1, 4),
    ('mythic', 'Mythic Hoard', 6500, 1950, 4999, 0, 0, 1, 5);

INSERT OR IGNORE INTO subscription_tiers
    (id, name, monthly_price_cents, yearly_price_cents, monthly_sparks, features, active, display_order)
VALUES
    ('apprentice', 'Apprentice', 499, 4990, 500, '[\"Ad-free feed\",\"500 Sparks every month\"]', 1, 1),
    ('storyteller', 'Storyteller', 999, 9990, 1200, '[\"Ad-free feed\",\"1200 Sparks every month\",\"AI co-host priority\"]', 1, 2),
    ('mythmaker', 'Mythmaker', 1999, 19990, 3000, '[\"Ad-free feed\",\"3000 Sparks every month\",\"AI co-host priority\",\"Vault analytics\"]', 1, 3);
";
