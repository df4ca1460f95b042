//! Stop-word filter used by text consumers of the datasource layer.

use datasource::stopwords::{RegexStopwords, StopwordFilter};

#[test]
fn test_filter_applies_to_fetched_text() {
    let filter = RegexStopwords::new(&["and", "or", "the"], 4).unwrap();

    let titles = vec!["Pride and Prejudice".to_string(), "The Trial".to_string()];
    let cleaned = filter.remove_stopwords_all(&titles);

    assert_eq!(cleaned, vec!["Pride  Prejudice", " Trial"]);
    assert_eq!(filter.chars_per_gram(), 4);
}
