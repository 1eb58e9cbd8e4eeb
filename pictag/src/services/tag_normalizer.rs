//! Tag cleanup rules
//!
//! Model tag lists arrive messy: mixed case, stray whitespace, duplicates.
//! Normalization is pure and idempotent so a record can be re-normalized
//! on update without drift.

/// Tags that imply a person is in frame
const PERSON_INDICATORS: &[&str] = &["man", "woman", "men", "women", "people", "child", "children"];

/// Lowercase, trim, de-duplicate, inject derived tags, sort
pub fn normalize_tags(raw: &[String], is_text: bool) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if is_text && !tags.iter().any(|t| t == "text") {
        tags.push("text".to_string());
    }

    if tags.iter().any(|t| PERSON_INDICATORS.contains(&t.as_str()))
        && !tags.iter().any(|t| t == "person")
    {
        tags.push("person".to_string());
    }

    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_case_dedup_and_blank_removal() {
        let out = normalize_tags(&raw(&["Chicken", "chicken", "BIRD", " "]), false);
        assert_eq!(out, vec!["bird", "chicken"]);
    }

    #[test]
    fn test_whitespace_trimmed() {
        let out = normalize_tags(&raw(&["  Sunset ", "beach\t"]), false);
        assert_eq!(out, vec!["beach", "sunset"]);
    }

    #[test]
    fn test_text_tag_injected_for_textual_content() {
        let out = normalize_tags(&raw(&["diagram"]), true);
        assert_eq!(out, vec!["diagram", "text"]);
    }

    #[test]
    fn test_text_tag_not_duplicated() {
        let out = normalize_tags(&raw(&["Text", "note"]), true);
        assert_eq!(out, vec!["note", "text"]);
    }

    #[test]
    fn test_person_tag_injected() {
        let out = normalize_tags(&raw(&["People", "street"]), false);
        assert_eq!(out, vec!["people", "person", "street"]);

        let out = normalize_tags(&raw(&["woman", "portrait"]), false);
        assert_eq!(out, vec!["person", "portrait", "woman"]);
    }

    #[test]
    fn test_person_tag_not_duplicated() {
        let out = normalize_tags(&raw(&["man", "person"]), false);
        assert_eq!(out, vec!["man", "person"]);
    }

    #[test]
    fn test_no_person_without_indicator() {
        let out = normalize_tags(&raw(&["mountain", "lake"]), false);
        assert_eq!(out, vec!["lake", "mountain"]);
    }

    #[test]
    fn test_idempotent() {
        let inputs = vec![
            raw(&["Chicken", "chicken", "BIRD", " "]),
            raw(&["People", "street"]),
            raw(&["diagram"]),
        ];
        for input in inputs {
            for is_text in [false, true] {
                let once = normalize_tags(&input, is_text);
                let twice = normalize_tags(&once, is_text);
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_tags(&[], false).is_empty());
        assert_eq!(normalize_tags(&[], true), vec!["text"]);
    }
}
