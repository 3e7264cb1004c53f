//! Inspection and light repair of the recipe JSON returned by the scrape endpoint.
//!
//! The importer never parses pages itself. It only checks that the server's
//! extraction produced something worth saving and trims fields the create
//! endpoint would reject.

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use super::ScrapedPayload;

/// Server-side limit on recipe names.
pub const MAX_NAME_CHARS: usize = 128;

/// Server-side limit on keyword names.
pub const MAX_KEYWORD_CHARS: usize = 64;

const QUALITY_FIELDS: [&str; 3] = ["name", "description", "image_url"];

/// Sites known to defeat server-side extraction, with the reason shown to the operator.
const KNOWN_PROBLEM_HOSTS: [(&str, &str); 3] = [
    (
        "www.foodnetwork.com",
        "Food Network requires special handling the server's scraper cannot provide",
    ),
    ("www.food.com", "Food.com has anti-scraping measures"),
    (
        "www.allrecipes.com",
        "AllRecipes may have updated their page structure",
    ),
];

/// Result of [`assess_quality`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityVerdict {
    /// The payload has enough content to create a recipe.
    Usable,
    /// The scrape technically succeeded but produced an empty shell.
    Unusable {
        /// Operator-facing explanation.
        reason: String,
    },
}

/// Decides whether a scraped recipe is worth creating.
///
/// A payload is unusable when at least two of `name`, `description` and
/// `image_url` are blank and no step carries an instruction or ingredients.
#[must_use]
pub fn assess_quality(recipe: &Value, source_url: &str) -> QualityVerdict {
    let Some(fields) = recipe.as_object() else {
        return QualityVerdict::Unusable {
            reason: "recipe payload is not a JSON object".to_string(),
        };
    };

    let blank = QUALITY_FIELDS
        .iter()
        .filter(|field| is_blank(fields.get(**field)))
        .count();
    if blank < 2 || has_meaningful_steps(fields) {
        return QualityVerdict::Usable;
    }

    let host = Url::parse(source_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    let reason = KNOWN_PROBLEM_HOSTS
        .iter()
        .find(|(known, _)| *known == host)
        .map_or_else(
            || format!("website {host} returned no usable recipe data"),
            |(_, reason)| (*reason).to_string(),
        );
    debug!(source_url, blank_fields = blank, "scraped payload rejected");
    QualityVerdict::Unusable { reason }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn has_meaningful_steps(fields: &Map<String, Value>) -> bool {
    let Some(steps) = fields.get("steps").and_then(Value::as_array) else {
        return false;
    };
    steps.iter().any(|step| {
        let instruction = step
            .get("instruction")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        let ingredients = step
            .get("ingredients")
            .and_then(Value::as_array)
            .is_some_and(|list| !list.is_empty());
        instruction || ingredients
    })
}

/// Applies the fixes the create endpoint needs and returns the patched payload.
///
/// - blank `name` is derived from the URL's last path segment
/// - `name` is cut to [`MAX_NAME_CHARS`]
/// - `servings` that is not a positive integer becomes 1
/// - keyword names are cut to [`MAX_KEYWORD_CHARS`]
/// - `source_url` is filled in when absent
///
/// Non-object payloads are returned untouched.
#[must_use]
pub fn prepare_for_create(mut recipe: Value, source_url: &str) -> Value {
    let Some(fields) = recipe.as_object_mut() else {
        return recipe;
    };

    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let name = if name.is_empty() {
        let fallback = fallback_name(source_url);
        debug!(source_url, name = %fallback, "blank recipe name, using URL fallback");
        fallback
    } else {
        name
    };
    fields.insert(
        "name".to_string(),
        Value::String(truncate_chars(&name, MAX_NAME_CHARS)),
    );

    let servings_ok = fields
        .get("servings")
        .and_then(Value::as_i64)
        .is_some_and(|n| n > 0);
    if !servings_ok {
        fields.insert("servings".to_string(), Value::from(1));
    }

    if let Some(Value::Array(keywords)) = fields.get_mut("keywords") {
        for keyword in keywords.iter_mut() {
            if let Some(Value::String(kw_name)) = keyword.get_mut("name") {
                if kw_name.chars().count() > MAX_KEYWORD_CHARS {
                    *kw_name = truncate_chars(kw_name, MAX_KEYWORD_CHARS);
                }
            }
        }
    }

    if is_blank(fields.get("source_url")) {
        fields.insert(
            "source_url".to_string(),
            Value::String(source_url.to_string()),
        );
    }

    recipe
}

/// Image to attach after create: the recipe's own `image_url`, else the first scraped image.
#[must_use]
pub fn primary_image_url(payload: &ScrapedPayload) -> Option<&str> {
    payload
        .recipe
        .as_ref()
        .and_then(|r| r.get("image_url"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            payload
                .images
                .iter()
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
        })
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn fallback_name(source_url: &str) -> String {
    let Ok(parsed) = Url::parse(source_url) else {
        return "Imported Recipe".to_string();
    };
    let host = parsed.host_str().unwrap_or("unknown").to_string();
    let last = parsed
        .path_segments()
        .and_then(|segments| {
            segments
                .filter(|s| !s.is_empty() && *s != "recipes")
                .last()
                .map(str::to_string)
        });
    let Some(segment) = last else {
        return format!("Recipe from {host}");
    };

    let stem = segment
        .strip_suffix(".html")
        .or_else(|| segment.strip_suffix(".php"))
        .unwrap_or(&segment);
    let titled = stem
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ");
    let titled = titled
        .strip_suffix(" Recipe")
        .map(str::to_string)
        .unwrap_or(titled);
    if titled.is_empty() {
        format!("Recipe from {host}")
    } else {
        titled
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quality_rejects_empty_shell() {
        let recipe = json!({"name": "", "description": " ", "image_url": null, "steps": []});
        let verdict = assess_quality(&recipe, "https://blog.example.com/post");
        assert_eq!(
            verdict,
            QualityVerdict::Unusable {
                reason: "website blog.example.com returned no usable recipe data".to_string()
            }
        );
    }

    #[test]
    fn test_quality_accepts_steps_without_metadata() {
        let recipe = json!({
            "name": "",
            "description": "",
            "steps": [{"instruction": "", "ingredients": [{"amount": 1}]}]
        });
        assert_eq!(
            assess_quality(&recipe, "https://x.example.com/r"),
            QualityVerdict::Usable
        );
    }

    #[test]
    fn test_quality_accepts_single_blank_field() {
        let recipe = json!({"name": "Soup", "description": "", "image_url": "https://i.example.com/a.jpg"});
        assert_eq!(
            assess_quality(&recipe, "https://x.example.com/r"),
            QualityVerdict::Usable
        );
    }

    #[test]
    fn test_quality_names_known_problem_host() {
        let recipe = json!({});
        let QualityVerdict::Unusable { reason } =
            assess_quality(&recipe, "https://www.food.com/recipe/1")
        else {
            panic!("expected unusable");
        };
        assert!(reason.contains("anti-scraping"));
    }

    #[test]
    fn test_quality_rejects_non_object() {
        assert!(matches!(
            assess_quality(&json!([1, 2]), "https://x.example.com"),
            QualityVerdict::Unusable { .. }
        ));
    }

    #[test]
    fn test_prepare_derives_name_from_url() {
        let prepared = prepare_for_create(
            json!({"name": "  "}),
            "https://cook.example.com/recipes/lemon-drizzle-cake-recipe.html",
        );
        assert_eq!(prepared["name"], "Lemon Drizzle Cake");
    }

    #[test]
    fn test_prepare_name_fallback_uses_host_without_path() {
        let prepared = prepare_for_create(json!({}), "https://cook.example.com/");
        assert_eq!(prepared["name"], "Recipe from cook.example.com");
    }

    #[test]
    fn test_prepare_truncates_long_name() {
        let long = "a".repeat(300);
        let prepared = prepare_for_create(json!({"name": long}), "https://x.example.com/r");
        let name = prepared["name"].as_str().unwrap_or_default();
        assert_eq!(name.chars().count(), MAX_NAME_CHARS);
        assert!(name.ends_with("..."));
    }

    #[test]
    fn test_prepare_fixes_servings() {
        for bad in [json!(0), json!(-4), json!("four"), Value::Null] {
            let prepared =
                prepare_for_create(json!({"name": "x", "servings": bad}), "https://x.example.com/r");
            assert_eq!(prepared["servings"], 1);
        }
        let prepared =
            prepare_for_create(json!({"name": "x", "servings": 6}), "https://x.example.com/r");
        assert_eq!(prepared["servings"], 6);
    }

    #[test]
    fn test_prepare_truncates_keywords() {
        let prepared = prepare_for_create(
            json!({"name": "x", "keywords": [{"name": "k".repeat(80)}, {"name": "short"}]}),
            "https://x.example.com/r",
        );
        let first = prepared["keywords"][0]["name"].as_str().unwrap_or_default();
        assert_eq!(first.chars().count(), MAX_KEYWORD_CHARS);
        assert_eq!(prepared["keywords"][1]["name"], "short");
    }

    #[test]
    fn test_prepare_sets_source_url_only_when_absent() {
        let prepared = prepare_for_create(json!({"name": "x"}), "https://x.example.com/r");
        assert_eq!(prepared["source_url"], "https://x.example.com/r");

        let prepared = prepare_for_create(
            json!({"name": "x", "source_url": "https://canonical.example.com/r"}),
            "https://x.example.com/r",
        );
        assert_eq!(prepared["source_url"], "https://canonical.example.com/r");
    }

    #[test]
    fn test_primary_image_prefers_recipe_field() {
        let payload = ScrapedPayload {
            recipe: Some(json!({"image_url": "https://i.example.com/main.jpg"})),
            images: vec!["https://i.example.com/other.jpg".to_string()],
            duplicates: Vec::new(),
        };
        assert_eq!(
            primary_image_url(&payload),
            Some("https://i.example.com/main.jpg")
        );

        let payload = ScrapedPayload {
            recipe: Some(json!({"image_url": ""})),
            images: vec!["https://i.example.com/other.jpg".to_string()],
            duplicates: Vec::new(),
        };
        assert_eq!(
            primary_image_url(&payload),
            Some("https://i.example.com/other.jpg")
        );
    }
}
