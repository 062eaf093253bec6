use crate::config::{FilterKind, FilterSpec, NormalizerConfig};
use crate::normalizer::Normalizer;

const MORNING: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta name="csrf-token" content="5f1c9a">
    <title>City News</title>
    <script src="/assets/app.js?v=91ab3"></script>
  </head>
  <body>
    <h1>Headlines</h1>
    <div class="sidebar dynamic">Rendered at 10:01:33</div>
    <span id="timestamp">2024-05-01 10:01</span>
    <a href="/story?id=7&sessionid=a8f3b2">Council approves budget</a>
    <form action="/subscribe">
      <input type="hidden" name="token" value="aa11">
      <button>Subscribe</button>
    </form>
  </body>
</html>"#;

const EVENING: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta name="csrf-token" content="e02d77">
<title>City News</title>
<script src="/assets/app.js?v=c4d10"></script>
</head>
<body>
<h1>Headlines</h1>
<div class="sidebar dynamic">Rendered at 18:45:02</div>
<span id="timestamp">2024-05-01 18:45</span>
<a href="/story?id=7&sessionid=ff0912">Council approves budget</a>
<form action="/subscribe">
<input type="hidden" name="token" value="bb22">
<button>Subscribe</button>
</form>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_document_canonical_form() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.normalize("<p>Hello   <b>world</b></p>"),
            "<html><head></head><body><p>Hello <b>world</b></p></body></html>"
        );
    }

    #[test]
    fn test_volatile_noise_normalizes_identically() {
        let normalizer = Normalizer::default();
        let morning = normalizer.normalize(MORNING);
        let evening = normalizer.normalize(EVENING);
        assert_eq!(morning, evening);

        // The content survives, the noise does not
        assert!(morning.contains("<h1>Headlines</h1>"));
        assert!(morning.contains(r#"<a href="/story?id=7">Council approves budget</a>"#));
        assert!(morning.contains(r#"/assets/app.js?v=DYNAMIC"#));
        assert!(!morning.contains("Rendered at"));
        assert!(!morning.contains("timestamp"));
        assert!(!morning.contains("csrf"));
        assert!(!morning.contains("<input"));
        assert!(!morning.contains("Subscribe"));
        assert!(!morning.contains("  "));
    }

    #[test]
    fn test_session_token_and_dynamic_block_only() {
        let normalizer = Normalizer::default();
        let first = r#"<p>Price: 10 EUR</p><a href="/buy?sid=111">Buy</a><div class="dynamic">visitors: 12</div>"#;
        let second = r#"<p>Price: 10 EUR</p><a href="/buy?sid=222">Buy</a><div class="dynamic">visitors: 97</div>"#;
        assert_eq!(normalizer.normalize(first), normalizer.normalize(second));
    }

    #[test]
    fn test_content_change_is_preserved() {
        let normalizer = Normalizer::default();
        let changed = MORNING.replace("Council approves budget", "Council rejects budget");
        assert_ne!(normalizer.normalize(MORNING), normalizer.normalize(&changed));
    }

    #[test]
    fn test_whitespace_only_differences_are_absorbed() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.normalize("<ul>\n  <li>One</li>\n  <li>Two</li>\n</ul>"),
            normalizer.normalize("<ul> <li>One</li>\t<li>Two</li>\r\n</ul>")
        );
    }

    #[test]
    fn test_entity_encoded_parameter_is_stripped() {
        let normalizer = Normalizer::default();
        let canonical = normalizer.normalize(r#"<a href="/list?page=2&#38;sid=abc">next</a>"#);
        assert!(canonical.contains(r#"<a href="/list?page=2">next</a>"#));
    }

    #[test]
    fn test_malformed_markup_degrades_gracefully() {
        let normalizer = Normalizer::default();
        let inputs = [
            "",
            "<",
            "<<<>>>",
            "<div><p>never closed",
            "</div></div></body>",
            "<table><tr><td>cell<td>cell</table></table>",
            "<div class=\"dynamic\"><p>unterminated dynamic block",
            "\u{0}\u{feff}<p>odd bytes</p>",
        ];
        for input in inputs {
            let canonical = normalizer.normalize(input);
            assert!(
                canonical.starts_with("<html>"),
                "input {:?} produced {:?}",
                input,
                canonical
            );
        }
    }

    #[test]
    fn test_default_filter_order() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.filter_names(),
            vec![
                "strip_volatile_params",
                "collapse_whitespace",
                "remove_dynamic_elements",
                "replace_dynamic_fragments",
                "tidy_whitespace",
            ]
        );
    }

    #[test]
    fn test_custom_pipeline() {
        let config = NormalizerConfig {
            filters: vec![
                FilterSpec::new(
                    "drop_ads",
                    FilterKind::RemoveElements {
                        selectors: vec![".ad".to_string()],
                    },
                ),
                FilterSpec::new("squash", FilterKind::CollapseWhitespace),
            ],
            max_passes: 4,
        };
        let normalizer = Normalizer::from_config(&config).unwrap();

        let with_ad = normalizer.normalize("<p>story</p><aside class=\"ad\">buy now</aside>");
        let without_ad = normalizer.normalize("<p>story</p>");
        assert_eq!(with_ad, without_ad);

        // The default dynamic marker is not part of this pipeline
        let dynamic = normalizer.normalize("<p>story</p><div class=\"dynamic\">x</div>");
        assert!(dynamic.contains("dynamic"));
    }

    #[test]
    fn test_text_only_pipeline_is_not_reparsed() {
        let config = NormalizerConfig {
            filters: vec![FilterSpec::new("squash", FilterKind::CollapseWhitespace)],
            max_passes: 4,
        };
        let normalizer = Normalizer::from_config(&config).unwrap();
        assert_eq!(normalizer.normalize("  a \n b  "), "a b");
    }
}
