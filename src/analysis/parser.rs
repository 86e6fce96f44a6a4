//! Heuristic extraction of ingredient and trigger lists from the model's
//! free-text reply.
//!
//! Expected shape:
//!
//! ```text
//! Ingredients:
//! Grilled Chicken | 150g
//! Rice | 80g
//!
//! Triggers:
//! gluten, lactose
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::MealAnalysisData;

const TRIGGERS_HEADING: &str = "triggers:";

lazy_static! {
    static ref QUANTITY_RE: Regex =
        Regex::new(r"^(\d+(?:\.\d+)?)\s*([A-Za-z]+)$").expect("static regex");
}

/// Splits a reply into ingredient lines and trigger tokens.
///
/// Any non-blank line containing `|` counts as an ingredient, wherever it
/// appears in the reply. Triggers come from the first line starting with
/// `Triggers:` (any case); when nothing follows the heading on that line the
/// next non-blank line is used.
pub fn parse_analysis_text(text: &str) -> MealAnalysisData {
    MealAnalysisData {
        ingredients: extract_ingredients(text),
        triggers: extract_triggers(text),
    }
}

fn extract_ingredients(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains('|'))
        .map(str::to_string)
        .collect()
}

fn extract_triggers(text: &str) -> Vec<String> {
    let mut lines = text.lines().map(str::trim);
    let Some(heading) = lines.find(|line| starts_with_ignore_case(line, TRIGGERS_HEADING)) else {
        return Vec::new();
    };

    let rest = heading[TRIGGERS_HEADING.len()..].trim();
    let source = if rest.is_empty() {
        lines.find(|line| !line.is_empty()).unwrap_or_default()
    } else {
        rest
    };

    source
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Splits a quantity like `"120g"` into `("120", "g")`. Anything that is not
/// a number followed by letters is returned whole with an empty unit.
pub fn split_quantity_unit(quantity: &str) -> (String, String) {
    let quantity = quantity.trim();
    match QUANTITY_RE.captures(quantity) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (quantity.to_string(), String::new()),
    }
}

/// Editable row shown to the user before a meal is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientDisplay {
    pub name: String,
    pub quantity: String,
    pub unit: String,
    pub editable: bool,
}

impl IngredientDisplay {
    /// Parses a stored `"Name | 120g"` string.
    pub fn from_raw(raw: &str) -> Self {
        let (name, quantity, unit) = match raw.split_once('|') {
            Some((name, qty)) => {
                let (quantity, unit) = split_quantity_unit(qty);
                (name.trim().to_string(), quantity, unit)
            }
            None => (raw.trim().to_string(), String::new(), String::new()),
        };
        Self {
            name,
            quantity,
            unit,
            editable: true,
        }
    }

    /// Back to the stored `"Name | 120g"` form.
    pub fn to_raw(&self) -> String {
        if self.quantity.is_empty() && self.unit.is_empty() {
            self.name.clone()
        } else {
            format!("{} | {}{}", self.name, self.quantity, self.unit)
        }
    }
}

pub fn to_display(ingredients: &[String]) -> Vec<IngredientDisplay> {
    ingredients.iter().map(|raw| IngredientDisplay::from_raw(raw)).collect()
}

#[cfg(test)]
mod parser_tests {
    use super::*;

    #[test]
    fn grilled_chicken_example() {
        let text = "Ingredients:\nGrilled Chicken | 150g\nRice | 80g\n\nTriggers:\nnone";
        let parsed = parse_analysis_text(text);
        assert_eq!(parsed.ingredients, vec!["Grilled Chicken | 150g", "Rice | 80g"]);
        assert_eq!(parsed.triggers, vec!["none"]);
    }

    #[test]
    fn triggers_on_the_heading_line() {
        let text = "Ingredients:\nBread | 60g\nTriggers: gluten, , Lactose ,";
        let parsed = parse_analysis_text(text);
        assert_eq!(parsed.ingredients, vec!["Bread | 60g"]);
        assert_eq!(parsed.triggers, vec!["gluten", "Lactose"]);
    }

    #[test]
    fn heading_is_case_insensitive_and_first_one_wins() {
        let text = "TRIGGERS: soy\ntriggers: egg";
        assert_eq!(parse_analysis_text(text).triggers, vec!["soy"]);
    }

    #[test]
    fn missing_triggers_line_gives_empty_list() {
        let parsed = parse_analysis_text("Ingredients:\nApple | 1pcs\n");
        assert!(parsed.triggers.is_empty());
        assert_eq!(parsed.ingredients.len(), 1);
    }

    #[test]
    fn counts_match_pipe_lines_and_tokens() {
        let text = "Ingredients:\n  A | 1g \nB|2g\nno pipe here\n   \nC | 3ml\nTriggers: x, y, z";
        let parsed = parse_analysis_text(text);
        assert_eq!(parsed.ingredients.len(), 3);
        assert_eq!(parsed.ingredients[0], "A | 1g");
        assert_eq!(parsed.triggers.len(), 3);
    }

    #[test]
    fn pipe_lines_outside_the_ingredient_block_still_count() {
        let text = "Ingredients:\nA | 1g\nTriggers:\nnuts | maybe";
        let parsed = parse_analysis_text(text);
        assert_eq!(parsed.ingredients, vec!["A | 1g", "nuts | maybe"]);
        assert_eq!(parsed.triggers, vec!["nuts | maybe"]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        let parsed = parse_analysis_text("   \n\n");
        assert!(parsed.ingredients.is_empty());
        assert!(parsed.triggers.is_empty());
    }

    #[test]
    fn quantity_unit_split() {
        assert_eq!(split_quantity_unit("120g"), ("120".into(), "g".into()));
        assert_eq!(split_quantity_unit(" 2.5 ml "), ("2.5".into(), "ml".into()));
        assert_eq!(split_quantity_unit("a handful"), ("a handful".into(), String::new()));
        assert_eq!(split_quantity_unit("100"), ("100".into(), String::new()));
    }

    #[test]
    fn display_model_round_trip() {
        let d = IngredientDisplay::from_raw("Grilled Chicken | 150g");
        assert_eq!(d.name, "Grilled Chicken");
        assert_eq!(d.quantity, "150");
        assert_eq!(d.unit, "g");
        assert!(d.editable);
        assert_eq!(d.to_raw(), "Grilled Chicken | 150g");

        let bare = IngredientDisplay::from_raw("Salt");
        assert_eq!(bare.quantity, "");
        assert_eq!(bare.to_raw(), "Salt");
    }
}
