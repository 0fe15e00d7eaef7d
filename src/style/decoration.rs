use std::sync::OnceLock;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecorationShape {
    #[default]
    ClosedCircle,
    OpenCircle,
    ClosedRectangle,
    OpenRectangle,
}

impl DecorationShape {
    pub fn is_filled(self) -> bool {
        matches!(
            self,
            DecorationShape::ClosedCircle | DecorationShape::ClosedRectangle
        )
    }

    pub fn is_circle(self) -> bool {
        matches!(
            self,
            DecorationShape::ClosedCircle | DecorationShape::OpenCircle
        )
    }
}

/// A rule that marks every branch whose label matches `pattern`.
///
/// The text tested is the clade's support label for internal clades and its
/// taxon name for leaves. Every enabled rule that matches is drawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BranchDecorationStyle {
    pattern: Option<String>,
    pub shape: DecorationShape,
    pub size: f32,
    pub color: Color,
    pub enabled: bool,
    #[serde(skip)]
    matcher: OnceLock<Option<Regex>>,
}

impl BranchDecorationStyle {
    pub fn new(pattern: Option<&str>, shape: DecorationShape, size: f32, color: Color) -> Self {
        Self {
            pattern: pattern.map(str::to_owned),
            shape,
            size,
            color,
            enabled: true,
            matcher: OnceLock::new(),
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Replaces the pattern and drops the compiled matcher.
    pub fn set_pattern(&mut self, pattern: Option<&str>) {
        self.pattern = pattern.map(str::to_owned);
        self.matcher = OnceLock::new();
    }

    /// Whether this rule applies to a branch labelled `text`.
    ///
    /// Disabled rules, rules without a pattern and rules whose pattern does not
    /// compile never match.
    pub fn is_match(&self, text: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.compiled()
            .map(|regex| regex.is_match(text))
            .unwrap_or(false)
    }

    fn compiled(&self) -> Option<&Regex> {
        self.matcher
            .get_or_init(|| {
                let pattern = self.pattern.as_deref()?;
                match Regex::new(pattern) {
                    Ok(regex) => Some(regex),
                    Err(err) => {
                        warn!("ignoring branch decoration with invalid pattern `{pattern}`: {err}");
                        None
                    }
                }
            })
            .as_ref()
    }
}

impl Default for BranchDecorationStyle {
    fn default() -> Self {
        Self::new(None, DecorationShape::ClosedCircle, 5.0, Color::BLACK)
    }
}

impl PartialEq for BranchDecorationStyle {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.shape == other.shape
            && self.size == other.size
            && self.color == other.color
            && self.enabled == other.enabled
    }
}
