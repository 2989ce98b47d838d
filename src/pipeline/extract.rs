//! Problem statement extraction from task pages.

use scraper::{ElementRef, Html, Selector};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};

/// Japanese and English statement sentences of one task page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Statements {
    pub ja: Vec<String>,
    pub en: Vec<String>,
}

/// Pulls statement sections out of task HTML.
///
/// Japanese statements are sections whose heading contains 「問題」, in the
/// modern layout (heading inside the section) and the legacy one (heading
/// right before it). English statements are sections under `span.lang-en`
/// whose heading contains "Statement".
pub struct StatementExtractor {
    sections: Selector,
    english_sections: Selector,
    headings: Selector,
}

impl StatementExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sections: parse_selector("section")?,
            english_sections: parse_selector("span.lang-en section")?,
            headings: parse_selector("h3")?,
        })
    }

    pub fn extract(&self, html: &str) -> Statements {
        let document = Html::parse_document(html);
        let mut statements = Statements::default();

        for section in document.select(&self.sections) {
            if self.heading_contains(section, "問題") || previous_heading_contains(section, "問題")
            {
                statements.ja.extend(section_sentences(section));
            }
        }

        for section in document.select(&self.english_sections) {
            if self.heading_contains(section, "Statement") {
                statements.en.extend(section_sentences(section));
            }
        }

        statements
    }

    fn heading_contains(&self, section: ElementRef, needle: &str) -> bool {
        section
            .select(&self.headings)
            .any(|h| h.text().collect::<String>().contains(needle))
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn previous_heading_contains(section: ElementRef, needle: &str) -> bool {
    section
        .prev_siblings()
        .find_map(ElementRef::wrap)
        .is_some_and(|prev| {
            prev.value().name() == "h3" && prev.text().collect::<String>().contains(needle)
        })
}

/// Sentences of each block-level child of `section`.
fn section_sentences(section: ElementRef) -> Vec<String> {
    let blocks: Vec<ElementRef> = section.children().filter_map(ElementRef::wrap).collect();
    let texts: Vec<String> = if blocks.is_empty() {
        vec![section.text().collect()]
    } else {
        blocks.iter().map(|b| b.text().collect()).collect()
    };

    texts
        .iter()
        .flat_map(|text| split_sentences(text))
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
