#![no_main]
use libfuzzer_sys::fuzz_target;
use mdmath_build::log_excerpt;
use mdmath_markdown::{InlinePattern, Markdown, MarkdownError, Position};
use regex::{Captures, Regex};

/// Same delimiters as the math rule, without the filesystem.
struct Echo(Regex);

impl InlinePattern for Echo {
    fn regex(&self) -> &Regex {
        &self.0
    }

    fn handle_match(&self, caps: &Captures<'_>) -> Result<Option<String>, MarkdownError> {
        Ok((!caps[1].trim().is_empty()).then(|| "<img />".to_string()))
    }
}

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    let _ = Markdown::new().convert(&s);

    let mut md = Markdown::new();
    if let Ok(re) = Regex::new(r"\$\$(.*?)\$\$") {
        let _ = md
            .inline_patterns
            .register("echo", Box::new(Echo(re)), Position::Begin);
    }
    let _ = md.convert(&s);
    let _ = log_excerpt::first_error(&s);
});
