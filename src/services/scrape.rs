// src/services/scrape.rs

//! HTML scrapers for AtCoder submission lists and rankings.

use chrono::DateTime;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Submission, User};

/// Compiled selectors for the AtCoder list pages.
pub struct PageScraper {
    rows: Selector,
    cells: Selector,
    links: Selector,
    spans: Selector,
    images: Selector,
    rank: Regex,
}

impl PageScraper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            rows: Self::parse_selector("tbody > tr")?,
            cells: Self::parse_selector("td")?,
            links: Self::parse_selector("a")?,
            spans: Self::parse_selector("span")?,
            images: Self::parse_selector("img")?,
            rank: Regex::new(r"\((\d+)\)")
                .map_err(|e| AppError::config(format!("invalid rank pattern: {e}")))?,
        })
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }

    /// Parse a submission list page. `contest_id` is left empty.
    ///
    /// Columns: submitted at, task, user, language, score, code length,
    /// status, then either execution time, memory and detail link or a
    /// single detail link while judging or on compile error.
    pub fn submissions(&self, html: &str) -> Result<Vec<Submission>> {
        let document = Html::parse_document(html);
        let mut submissions = Vec::new();

        for (i, tr) in document.select(&self.rows).enumerate() {
            let cells: Vec<ElementRef> = tr.select(&self.cells).collect();
            if cells.len() < 8 {
                return Err(malformed("submission", i, format!("{} columns", cells.len())));
            }

            let submitted_at = text_of(cells[0]);
            let epoch_second = DateTime::parse_from_str(&submitted_at, "%Y-%m-%d %H:%M:%S%z")
                .map_err(|e| malformed("submission", i, format!("time '{submitted_at}': {e}")))?
                .timestamp();

            let problem_id = self
                .first_link_segment(cells[1])
                .ok_or_else(|| malformed("submission", i, "missing task link"))?;
            let user_id = self
                .first_link_segment(cells[2])
                .ok_or_else(|| malformed("submission", i, "missing user link"))?;

            let score = text_of(cells[4]);
            let point = score
                .parse::<f64>()
                .map_err(|_| malformed("submission", i, format!("score '{score}'")))?;
            let length = text_of(cells[5])
                .trim_end_matches("Byte")
                .trim()
                .parse::<i64>()
                .unwrap_or_default();

            let mut id = None;
            let mut execution_time = None;
            for cell in &cells[7..] {
                let detail = cell
                    .select(&self.links)
                    .filter_map(|a| a.value().attr("href"))
                    .find(|href| href.contains("/submissions/"));
                if let Some(href) = detail {
                    id = last_segment(href).and_then(|s| s.parse::<i64>().ok());
                } else {
                    let text = text_of(*cell);
                    if let Some(ms) = text.strip_suffix("ms") {
                        execution_time = ms.trim().parse::<i64>().ok();
                    }
                }
            }
            let id = id.ok_or_else(|| malformed("submission", i, "missing detail link"))?;

            submissions.push(Submission {
                id,
                epoch_second,
                problem_id,
                contest_id: String::new(),
                user_id,
                language: text_of(cells[3]),
                point,
                length,
                result: text_of(cells[6]),
                execution_time,
            });
        }

        Ok(submissions)
    }

    /// Parse a ranking page.
    ///
    /// Columns: rank, user (flag, name and affiliation links plus a crown
    /// image), birth year, rating, highest rating, matches, wins.
    pub fn users(&self, html: &str) -> Result<Vec<User>> {
        let document = Html::parse_document(html);
        let mut users = Vec::new();

        for (i, tr) in document.select(&self.rows).enumerate() {
            let cells: Vec<ElementRef> = tr.select(&self.cells).collect();
            if cells.len() < 7 {
                return Err(malformed("user", i, format!("{} columns", cells.len())));
            }

            let mut user = User::default();

            let rank_text: String = cells[0].select(&self.spans).flat_map(|s| s.text()).collect();
            user.rank = self
                .rank
                .captures(&rank_text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| malformed("user", i, format!("rank '{rank_text}'")))?;
            let active_rank: String = cells[0]
                .children()
                .filter_map(|node| node.value().as_text().map(|t| t.trim().to_string()))
                .collect();
            user.active_rank = active_rank.trim().parse().ok();

            for (k, a) in cells[1].select(&self.links).enumerate() {
                match k {
                    0 => {
                        user.country = a
                            .select(&self.images)
                            .next()
                            .and_then(|img| img.value().attr("src"))
                            .and_then(file_stem);
                    }
                    1 => user.user_name = a.select(&self.spans).flat_map(|s| s.text()).collect(),
                    2 => {
                        let affiliation: String =
                            a.select(&self.spans).flat_map(|s| s.text()).collect();
                        if !affiliation.is_empty() {
                            user.affiliation = Some(affiliation);
                        }
                    }
                    _ => {}
                }
            }
            if user.user_name.is_empty() {
                return Err(malformed("user", i, "missing user name"));
            }

            user.crown = cells[1]
                .children()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "img")
                .and_then(|img| img.value().attr("src"))
                .and_then(file_stem);

            user.birth_year = text_of(cells[2]).parse().ok();
            let rating = text_of(cells[3]);
            user.rating = rating
                .parse()
                .map_err(|_| malformed("user", i, format!("rating '{rating}'")))?;
            user.highest_rating = text_of(cells[4]).parse().unwrap_or(user.rating);
            user.join_count = text_of(cells[5]).parse().unwrap_or_default();
            user.wins = text_of(cells[6]).parse().unwrap_or_default();

            users.push(user);
        }

        Ok(users)
    }

    fn first_link_segment(&self, cell: ElementRef) -> Option<String> {
        cell.select(&self.links)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(last_segment)
            .map(str::to_string)
    }
}

fn malformed(kind: &str, row: usize, detail: impl std::fmt::Display) -> AppError {
    AppError::fetch(format!("{kind} row {}", row + 1), format!("malformed row: {detail}"))
}

fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Last path segment of an href, ignoring query and fragment.
fn last_segment(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next()?;
    path.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
}

/// `img/flag/JP.png` -> `JP`
fn file_stem(src: &str) -> Option<String> {
    let name = last_segment(src)?;
    let stem = name.split('.').next().unwrap_or(name);
    (!stem.is_empty()).then(|| stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBMISSIONS_HTML: &str = r#"
<table class="table">
<thead><tr><th>Submission Time</th><th>Task</th></tr></thead>
<tbody>
<tr>
  <td class="no-break"><time class="fixtime fixtime-second">2023-04-22 22:39:58+0900</time></td>
  <td><a href="/contests/abc300/tasks/abc300_a">A - N-choice question</a></td>
  <td><a href="/users/tourist">tourist</a> <a href="/contests/abc300/submissions?f.User=tourist"><span class="glyphicon glyphicon-search"></span></a></td>
  <td><a href="/contests/abc300/submissions?f.Language=5001">C++ 20 (gcc 12.2)</a></td>
  <td class="text-right submission-score" data-id="41000000">100</td>
  <td class="text-right">252 Byte</td>
  <td class="text-center"><span class="label label-success">AC</span></td>
  <td class="text-right">1 ms</td>
  <td class="text-right">3604 KB</td>
  <td class="text-center"><a href="/contests/abc300/submissions/41000000">Detail</a></td>
</tr>
<tr>
  <td class="no-break"><time class="fixtime fixtime-second">2023-04-22 22:38:00+0900</time></td>
  <td><a href="/contests/abc300/tasks/abc300_b">B - Same Map in the RPG World</a></td>
  <td><a href="/users/rng_58">rng_58</a></td>
  <td><a href="/contests/abc300/submissions?f.Language=5055">Python (CPython 3.11.4)</a></td>
  <td class="text-right submission-score">0</td>
  <td class="text-right">1024 Byte</td>
  <td class="text-center"><span class="label label-warning">CE</span></td>
  <td class="text-center" colspan="3"><a href="/contests/abc300/submissions/40999999">Detail</a></td>
</tr>
</tbody>
</table>
"#;

    const RANKING_HTML: &str = r#"
<table class="table table-bordered table-striped th-center">
<tbody>
<tr>
  <td class="no-break">1 <span class="small">(1)</span></td>
  <td class="no-break">
    <a href="/ranking?f.Country=BY"><img src="//img.atcoder.jp/assets/flag/BY.png" width="16"></a>
    <img src="//img.atcoder.jp/assets/icon/crown4000.gif">
    <a href="/users/tourist" class="username"><span class="user-red">tourist</span></a>
    <a href="/ranking?f.Affiliation=ITMO+University" class="ranking-affiliation"><span class="grey">ITMO University</span></a>
  </td>
  <td>1994</td>
  <td><b>3779</b></td>
  <td><b>4229</b></td>
  <td>60</td>
  <td>22</td>
</tr>
<tr>
  <td class="no-break"><span class="small">(2)</span></td>
  <td class="no-break">
    <a href="/ranking?f.Country=JP"><img src="//img.atcoder.jp/assets/flag/JP.png" width="16"></a>
    <a href="/users/inactive" class="username"><span class="user-orange">inactive</span></a>
  </td>
  <td></td>
  <td>2500</td>
  <td>2700</td>
  <td>10</td>
  <td>0</td>
</tr>
</tbody>
</table>
"#;

    #[test]
    fn test_parse_selector_invalid() {
        assert!(PageScraper::parse_selector("[[invalid").is_err());
    }

    #[test]
    fn test_scrape_submissions() {
        let scraper = PageScraper::new().unwrap();
        let submissions = scraper.submissions(SUBMISSIONS_HTML).unwrap();

        assert_eq!(submissions.len(), 2);
        let ac = &submissions[0];
        assert_eq!(ac.id, 41000000);
        assert_eq!(ac.epoch_second, 1682170798);
        assert_eq!(ac.problem_id, "abc300_a");
        assert_eq!(ac.user_id, "tourist");
        assert_eq!(ac.language, "C++ 20 (gcc 12.2)");
        assert_eq!(ac.point, 100.0);
        assert_eq!(ac.length, 252);
        assert_eq!(ac.result, "AC");
        assert_eq!(ac.execution_time, Some(1));

        let ce = &submissions[1];
        assert_eq!(ce.id, 40999999);
        assert_eq!(ce.result, "CE");
        assert_eq!(ce.execution_time, None);
    }

    #[test]
    fn test_scrape_empty_submission_page() {
        let scraper = PageScraper::new().unwrap();
        let html = "<table><tbody></tbody></table>";
        assert!(scraper.submissions(html).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_submission_is_persistent() {
        let scraper = PageScraper::new().unwrap();
        let html = "<table><tbody><tr><td>oops</td></tr></tbody></table>";
        let err = scraper.submissions(html).unwrap_err();
        assert!(matches!(err, AppError::Fetch { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_scrape_users() {
        let scraper = PageScraper::new().unwrap();
        let users = scraper.users(RANKING_HTML).unwrap();

        assert_eq!(users.len(), 2);
        let tourist = &users[0];
        assert_eq!(tourist.user_name, "tourist");
        assert_eq!(tourist.rank, 1);
        assert_eq!(tourist.active_rank, Some(1));
        assert_eq!(tourist.country.as_deref(), Some("BY"));
        assert_eq!(tourist.crown.as_deref(), Some("crown4000"));
        assert_eq!(tourist.affiliation.as_deref(), Some("ITMO University"));
        assert_eq!(tourist.birth_year, Some(1994));
        assert_eq!(tourist.rating, 3779);
        assert_eq!(tourist.highest_rating, 4229);
        assert_eq!(tourist.join_count, 60);
        assert_eq!(tourist.wins, 22);

        let inactive = &users[1];
        assert_eq!(inactive.rank, 2);
        assert_eq!(inactive.active_rank, None);
        assert_eq!(inactive.affiliation, None);
        assert_eq!(inactive.crown, None);
        assert_eq!(inactive.birth_year, None);
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/contests/abc300/tasks/abc300_a"), Some("abc300_a"));
        assert_eq!(last_segment("/users/tourist?lang=en"), Some("tourist"));
        assert_eq!(last_segment(""), None);
    }
}
