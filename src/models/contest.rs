//! Contest data structure and category assignment.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// AGC001 start; contests before it were never rated.
const AGC001_STARTED_AT: i64 = 1468670400;

/// A contest as listed by AtCoder Problems.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contest {
    pub id: String,
    pub start_epoch_second: i64,
    pub duration_second: i64,
    pub title: String,
    pub rate_change: String,
}

/// Who a contest was rated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatedTarget {
    All,
    Unrated,
    UpperBound(i64),
    LowerBound(i64),
}

impl Contest {
    /// Parse `rate_change` ("-", "All", " ~ 1999", "1200 ~ ").
    pub fn rated_target(&self) -> RatedTarget {
        if self.start_epoch_second < AGC001_STARTED_AT {
            return RatedTarget::Unrated;
        }

        match self.rate_change.as_str() {
            "-" => RatedTarget::Unrated,
            "All" => RatedTarget::All,
            other => {
                let range: Vec<&str> = other.split('~').map(str::trim).collect();
                if range.len() != 2 {
                    return RatedTarget::Unrated;
                }
                if let Ok(lower) = range[0].parse::<i64>() {
                    return RatedTarget::LowerBound(lower);
                }
                if let Ok(upper) = range[1].parse::<i64>() {
                    return RatedTarget::UpperBound(upper);
                }
                RatedTarget::Unrated
            }
        }
    }
}

/// Assigns a category to a contest.
///
/// Owns its compiled patterns; build one per crawl and pass it around.
pub struct ContestCategorizer {
    jag: Regex,
    marathon_title: Regex,
    marathon_id: Regex,
    sponsored: Vec<Regex>,
}

const MARATHON_IDS: &[&str] = &[
    "genocon2021",
    "stage0-2021",
    "caddi2019",
    "pakencamp-2019-day2",
    "kuronekoyamato-contest2019",
    "wn2017_1",
];

impl ContestCategorizer {
    pub fn new() -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| AppError::config(format!("invalid pattern {p}: {e}")))
        };

        Ok(Self {
            jag: compile("^(jag|JAG)")?,
            marathon_title: compile(
                "(^Chokudai Contest|ハーフマラソン|^HACK TO THE FUTURE|Asprova|Heuristics Contest)",
            )?,
            marathon_id: compile("(^future-meets-you-contest|^hokudai-hitachi)")?,
            sponsored: vec![
                compile("ドワンゴ|^Mujin|SoundHound|^codeFlyer|^COLOCON|みんなのプロコン|CODE THANKS FESTIVAL")?,
                compile("(CODE FESTIVAL|^DISCO|日本最強プログラマー学生選手権|全国統一プログラミング王|Indeed)")?,
                compile("(^Donuts|^dwango|^DigitalArts|^Code Formula|天下一プログラマーコンテスト)")?,
            ],
        })
    }

    pub fn categorize(&self, contest: &Contest) -> &'static str {
        let id = contest.id.as_str();
        for (prefix, category) in [("abc", "ABC"), ("arc", "ARC"), ("agc", "AGC"), ("ahc", "AHC")] {
            if id.starts_with(prefix) {
                return category;
            }
        }

        match contest.rated_target() {
            RatedTarget::All => "AGC-Like",
            RatedTarget::UpperBound(_) => "ABC-Like",
            RatedTarget::LowerBound(_) => "ARC-Like",
            RatedTarget::Unrated => {
                if id.starts_with("past") {
                    "PAST"
                } else if id.starts_with("joi") {
                    "JOI"
                } else if self.jag.is_match(id) {
                    "JAG"
                } else if self.marathon_title.is_match(&contest.title)
                    || self.marathon_id.is_match(id)
                    || MARATHON_IDS.contains(&id)
                {
                    "Marathon"
                } else if self.sponsored.iter().any(|p| p.is_match(&contest.title)) {
                    "Other Sponsored"
                } else {
                    "Other Contests"
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contest(id: &str, start: i64, title: &str, rate_change: &str) -> Contest {
        Contest {
            id: id.into(),
            start_epoch_second: start,
            duration_second: 6000,
            title: title.into(),
            rate_change: rate_change.into(),
        }
    }

    #[test]
    fn test_rated_target() {
        assert_eq!(
            contest("abc001", 1381579200, "ABC 001", "-").rated_target(),
            RatedTarget::Unrated
        );
        assert_eq!(
            contest("abc042", 1469275200, "ABC 042", " ~ 1199").rated_target(),
            RatedTarget::UpperBound(1199)
        );
        assert_eq!(
            contest("arc058", 1469275200, "ARC 058", " ~ 2799").rated_target(),
            RatedTarget::UpperBound(2799)
        );
        assert_eq!(
            contest("agc001", 1468670400, "AGC 001", "All").rated_target(),
            RatedTarget::All
        );
        assert_eq!(
            contest("arc104", 1601740800, "ARC 104", "1200 ~ ").rated_target(),
            RatedTarget::LowerBound(1200)
        );
    }

    #[test]
    fn test_categorize() {
        let c = ContestCategorizer::new().unwrap();

        assert_eq!(c.categorize(&contest("abc300", 1682164800, "ABC 300", " ~ 1999")), "ABC");
        assert_eq!(
            c.categorize(&contest("keyence2021", 1610798400, "KEYENCE 2021", " ~ 2799")),
            "ABC-Like"
        );
        assert_eq!(
            c.categorize(&contest("past202012-open", 1608361200, "PAST", "-")),
            "PAST"
        );
        assert_eq!(
            c.categorize(&contest("chokudai005", 1600000000, "Chokudai Contest 005", "-")),
            "Marathon"
        );
        assert_eq!(
            c.categorize(&contest("dwacon2018", 1500000000, "ドワンゴからの挑戦状", "-")),
            "Other Sponsored"
        );
        assert_eq!(
            c.categorize(&contest("xmascon", 1500000000, "Xmas Contest", "-")),
            "Other Contests"
        );
    }
}
