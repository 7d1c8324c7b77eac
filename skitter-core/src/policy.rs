use crate::report::Category;
use url::Url;

/// Asset extensions worth fetching for further references.
const CRAWLABLE_ASSET_EXTENSIONS: &[&str] = &[".js", ".xml", ".json"];

/// URLs to schedule for a record of `category` with the given `output`.
///
/// References are always followed. Script and data assets are followed when
/// their path ends in `.js`, `.xml` or `.json`; a minified script also
/// schedules its unminified sibling. Nothing else is followed.
pub fn follow_ups(category: Category, output: &str) -> Vec<String> {
    match category {
        Category::Reference => vec![output.to_string()],
        Category::ScriptOrDataAsset => {
            let mut next = Vec::new();
            if CRAWLABLE_ASSET_EXTENSIONS.contains(&extension(output).as_str()) {
                next.push(output.to_string());
                if output.contains(".min.js") {
                    next.push(output.replace(".min.js", ".js"));
                }
            }
            next
        }
        Category::UploadForm
        | Category::Form
        | Category::FetchedPage
        | Category::CloudBucket
        | Category::Domain => Vec::new(),
    }
}

/// Lower-cased extension (with the dot) of the last path segment, or an empty
/// string when there is none.
pub fn extension(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let last = parsed.path().rsplit('/').next().unwrap_or_default();
    match last.rfind('.') {
        Some(dot) => last[dot..].to_ascii_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_are_followed() {
        assert_eq!(
            follow_ups(Category::Reference, "https://x.test/about"),
            vec!["https://x.test/about".to_string()]
        );
    }

    #[test]
    fn test_minified_script_adds_sibling() {
        assert_eq!(
            follow_ups(Category::ScriptOrDataAsset, "https://x.test/app.min.js"),
            vec![
                "https://x.test/app.min.js".to_string(),
                "https://x.test/app.js".to_string()
            ]
        );
    }

    #[test]
    fn test_data_assets_followed() {
        assert_eq!(
            follow_ups(Category::ScriptOrDataAsset, "https://x.test/feed.xml?v=2"),
            vec!["https://x.test/feed.xml?v=2".to_string()]
        );
        assert_eq!(
            follow_ups(Category::ScriptOrDataAsset, "https://x.test/CONFIG.JSON"),
            vec!["https://x.test/CONFIG.JSON".to_string()]
        );
    }

    #[test]
    fn test_other_assets_not_followed() {
        assert!(follow_ups(Category::ScriptOrDataAsset, "https://x.test/logo.png").is_empty());
        assert!(follow_ups(Category::ScriptOrDataAsset, "https://x.test/js/").is_empty());
        // Extension must be on the path, not the query
        assert!(follow_ups(Category::ScriptOrDataAsset, "https://x.test/load?f=a.js").is_empty());
    }

    #[test]
    fn test_terminal_categories() {
        for category in [
            Category::Form,
            Category::UploadForm,
            Category::FetchedPage,
            Category::CloudBucket,
            Category::Domain,
        ] {
            assert!(follow_ups(category, "https://x.test/login").is_empty());
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("https://x.test/a/b.min.js"), ".js");
        assert_eq!(extension("https://x.test/a.b/c"), "");
        assert_eq!(extension("https://x.test/"), "");
        assert_eq!(extension("not a url"), "");
    }
}
