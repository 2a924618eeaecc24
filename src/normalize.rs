//! Turning a configured spreadsheet reference into a URL that serves CSV.
//!
//! Google Sheets hands out several URL shapes for the same document: the
//! interactive editor, the "publish to the web" page and the direct export
//! endpoint. Only some of them answer with CSV. A [`Normalizer`] holds an
//! ordered list of [`NormalizationRule`]s and applies the first one whose
//! predicate matches.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SHEET_ID_REGEX: Regex = Regex::new(r"/d/([A-Za-z0-9_-]+)/").unwrap();
    static ref GID_REGEX: Regex = Regex::new(r"[#?&]gid=([0-9]+)").unwrap();
}

/// Path segment Google uses for published documents (`/d/e/2PACX-.../`).
/// It is a namespace, not a spreadsheet id.
const PUBLISHED_NAMESPACE: &str = "e";

/// A pure predicate + transform pair.
#[derive(Clone, Copy)]
pub struct NormalizationRule {
    pub name: &'static str,
    pub applies: fn(&str) -> bool,
    pub transform: fn(&str) -> String,
}

impl std::fmt::Debug for NormalizationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizationRule")
            .field("name", &self.name)
            .finish()
    }
}

/// Ordered rule list, first match wins.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<NormalizationRule>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            rules: vec![ALREADY_CSV, PUBLISHED_HTML, SHEET_ID, APPEND_OUTPUT],
        }
    }
}

impl Normalizer {
    /// A normalizer with no rules; every reference passes through unchanged.
    pub fn empty() -> Self {
        Normalizer { rules: Vec::new() }
    }

    /// Append a rule after the existing ones.
    pub fn with_rule(mut self, rule: NormalizationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule ahead of the existing ones.
    pub fn with_rule_first(mut self, rule: NormalizationRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn rules(&self) -> &[NormalizationRule] {
        &self.rules
    }

    /// Apply the first matching rule, or return the reference unchanged.
    pub fn normalize(&self, reference: &str) -> String {
        self.matching_rule(reference)
            .map(|rule| (rule.transform)(reference))
            .unwrap_or_else(|| reference.to_string())
    }

    /// The rule that [`normalize`](Self::normalize) would use.
    pub fn matching_rule(&self, reference: &str) -> Option<&NormalizationRule> {
        self.rules.iter().find(|rule| (rule.applies)(reference))
    }
}

/// Normalize with the default rule order.
pub fn normalize(reference: &str) -> String {
    Normalizer::default().normalize(reference)
}

pub const ALREADY_CSV: NormalizationRule = NormalizationRule {
    name: "already-csv",
    applies: is_csv_reference,
    transform: str::to_string,
};

pub const PUBLISHED_HTML: NormalizationRule = NormalizationRule {
    name: "published-html",
    applies: is_published_html,
    transform: published_html_to_csv,
};

pub const SHEET_ID: NormalizationRule = NormalizationRule {
    name: "sheet-id",
    applies: has_sheet_id,
    transform: sheet_id_to_export,
};

pub const APPEND_OUTPUT: NormalizationRule = NormalizationRule {
    name: "append-output",
    applies: lacks_output_csv,
    transform: append_output_csv,
};

fn is_csv_reference(reference: &str) -> bool {
    reference.contains("output=csv") || reference.contains("format=csv")
}

fn is_published_html(reference: &str) -> bool {
    reference.contains("pubhtml")
}

fn published_html_to_csv(reference: &str) -> String {
    if reference.contains("pubhtml?") {
        reference.replacen("pubhtml?", "pub?output=csv&", 1)
    } else {
        reference.replacen("pubhtml", "pub?output=csv", 1)
    }
}

/// Extract the spreadsheet id from a `/d/<id>/` segment.
pub fn sheet_id(reference: &str) -> Option<&str> {
    sheet_id_match(reference).map(|(id, _)| id)
}

// Returns the id and the byte offset just past the trailing slash.
fn sheet_id_match(reference: &str) -> Option<(&str, usize)> {
    SHEET_ID_REGEX.captures_iter(reference).find_map(|caps| {
        let id = caps.get(1)?;
        if id.as_str() == PUBLISHED_NAMESPACE {
            return None;
        }
        let whole = caps.get(0)?;
        Some((id.as_str(), whole.end()))
    })
}

fn has_sheet_id(reference: &str) -> bool {
    sheet_id_match(reference).is_some()
}

fn sheet_id_to_export(reference: &str) -> String {
    let Some((_, end)) = sheet_id_match(reference) else {
        return reference.to_string();
    };
    let mut url = format!("{}export?format=csv", &reference[..end]);
    if let Some(gid) = GID_REGEX.captures(&reference[end..]).and_then(|c| c.get(1)) {
        url.push_str("&gid=");
        url.push_str(gid.as_str());
    }
    url
}

fn lacks_output_csv(reference: &str) -> bool {
    !reference.contains("output=csv")
}

fn append_output_csv(reference: &str) -> String {
    let base = reference.split('#').next().unwrap_or(reference);
    if base.ends_with('?') || base.ends_with('&') {
        format!("{}output=csv", base)
    } else if base.contains('?') {
        format!("{}&output=csv", base)
    } else {
        format!("{}?output=csv", base)
    }
}
