use crate::records::ProductivityLabel;

const PRODUCTIVE_APPS: &[&str] = &["cursor", "vs code", "code", "terminal", "figma", "github"];
const PRODUCTIVE_TITLES: &[&str] = &["code", "development", "programming"];
const UNPRODUCTIVE_APPS: &[&str] = &["spotify"];
const UNPRODUCTIVE_TITLES: &[&str] = &["youtube", "twitter", "facebook", "reddit"];

/// Keyword fallback for records the classifier never resolved. Productive keywords
/// are checked before unproductive ones.
pub fn keyword_label(app_name: &str, window_title: &str) -> ProductivityLabel {
    let app = app_name.to_lowercase();
    let title = window_title.to_lowercase();

    if PRODUCTIVE_APPS.iter().any(|k| app.contains(k))
        || PRODUCTIVE_TITLES.iter().any(|k| title.contains(k))
    {
        return ProductivityLabel::Productive;
    }
    if UNPRODUCTIVE_APPS.iter().any(|k| app.contains(k))
        || UNPRODUCTIVE_TITLES.iter().any(|k| title.contains(k))
    {
        return ProductivityLabel::Unproductive;
    }
    ProductivityLabel::Neutral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_labels() {
        assert_eq!(keyword_label("Visual Studio Code", ""), ProductivityLabel::Productive);
        assert_eq!(keyword_label("Firefox", "Rust programming guide"), ProductivityLabel::Productive);
        assert_eq!(keyword_label("Spotify", "Daily Mix"), ProductivityLabel::Unproductive);
        assert_eq!(keyword_label("Chrome", "YouTube - Home"), ProductivityLabel::Unproductive);
        assert_eq!(keyword_label("Finder", "Downloads"), ProductivityLabel::Neutral);
    }
}
