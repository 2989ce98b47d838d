//! Database schema. Timestamps are epoch milliseconds unless the column
//! name says otherwise.

pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contests (
    contest_id TEXT PRIMARY KEY,
    start_epoch_second INTEGER NOT NULL,
    duration_second INTEGER NOT NULL,
    title TEXT NOT NULL,
    rate_change TEXT NOT NULL,
    category TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS difficulties (
    problem_id TEXT PRIMARY KEY,
    slope REAL,
    intercept REAL,
    variance REAL,
    difficulty INTEGER,
    discrimination REAL,
    irt_loglikelihood REAL,
    irt_users REAL,
    is_experimental INTEGER,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS problems (
    problem_id TEXT PRIMARY KEY,
    contest_id TEXT NOT NULL,
    problem_index TEXT NOT NULL,
    name TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    html TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_name TEXT PRIMARY KEY,
    rating INTEGER NOT NULL,
    highest_rating INTEGER NOT NULL,
    affiliation TEXT,
    birth_year INTEGER,
    country TEXT,
    crown TEXT,
    join_count INTEGER NOT NULL,
    rank INTEGER NOT NULL,
    active_rank INTEGER,
    wins INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY,
    epoch_second INTEGER NOT NULL,
    problem_id TEXT NOT NULL,
    contest_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    language TEXT NOT NULL,
    point REAL NOT NULL,
    length INTEGER NOT NULL,
    result TEXT NOT NULL,
    execution_time INTEGER,
    crawled_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_submissions_contest_id ON submissions(contest_id);
CREATE INDEX IF NOT EXISTS idx_submissions_crawled_at ON submissions(crawled_at);

CREATE TABLE IF NOT EXISTS crawl_watermarks (
    domain TEXT NOT NULL,
    partition_key TEXT NOT NULL,
    crawled_at INTEGER NOT NULL,
    PRIMARY KEY (domain, partition_key)
);

CREATE TABLE IF NOT EXISTS run_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    status TEXT NOT NULL,
    options TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_run_history_name ON run_history(name, status);
"#;
