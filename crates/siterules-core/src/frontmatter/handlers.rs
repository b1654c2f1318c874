//! Date handlers and the per-page descriptor they fill in

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, error};

use super::parse::{self, DateParser};
use crate::error::FrontMatterError;

/// Gets the date from the filename, e.g. `2018-02-22-mypage.md`
pub const FM_FILENAME: &str = ":filename";
/// Gets the date from the file's modification time
pub const FM_MODTIME: &str = ":filemodtime";
/// Gets the date from the Git author date
pub const FM_GIT_AUTHOR_DATE: &str = ":git";

/// One of the four page dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateField {
    Date,
    Lastmod,
    PublishDate,
    ExpiryDate,
}

impl DateField {
    /// Resolution order
    pub const ALL: [DateField; 4] = [
        DateField::Date,
        DateField::Lastmod,
        DateField::PublishDate,
        DateField::ExpiryDate,
    ];

    /// The canonical front matter key
    pub fn key(&self) -> &'static str {
        match self {
            DateField::Date => "date",
            DateField::Lastmod => "lastmod",
            DateField::PublishDate => "publishdate",
            DateField::ExpiryDate => "expirydate",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        DateField::ALL
            .into_iter()
            .find(|f| f.key().eq_ignore_ascii_case(key))
    }

    /// Front matter keys accepted in place of the canonical one
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            DateField::Date => &[],
            DateField::Lastmod => &["modified"],
            DateField::PublishDate => &["pubdate", "published"],
            DateField::ExpiryDate => &["unpublishdate"],
        }
    }
}

/// A page's resolved dates. `None` means no handler produced a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dates {
    pub date: Option<DateTime<FixedOffset>>,
    pub lastmod: Option<DateTime<FixedOffset>>,
    pub publish_date: Option<DateTime<FixedOffset>>,
    pub expiry_date: Option<DateTime<FixedOffset>>,
}

impl Dates {
    pub fn get(&self, field: DateField) -> Option<DateTime<FixedOffset>> {
        match field {
            DateField::Date => self.date,
            DateField::Lastmod => self.lastmod,
            DateField::PublishDate => self.publish_date,
            DateField::ExpiryDate => self.expiry_date,
        }
    }

    pub fn set(&mut self, field: DateField, value: DateTime<FixedOffset>) {
        let slot = match field {
            DateField::Date => &mut self.date,
            DateField::Lastmod => &mut self.lastmod,
            DateField::PublishDate => &mut self.publish_date,
            DateField::ExpiryDate => &mut self.expiry_date,
        };
        *slot = Some(value);
    }
}

/// URL related values of a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPath {
    pub slug: String,
}

/// Everything date resolution needs to know about one page.
///
/// The output targets (`params`, `dates`, `page_urls`) belong to the page
/// and are updated in place.
#[derive(Debug)]
pub struct FrontMatterDescriptor<'a> {
    /// The page's front matter, with lower-case keys
    pub frontmatter: &'a Map<String, Value>,
    /// The page's base filename (e.g. `page.md`), or the bundle folder name
    pub base_filename: &'a str,
    /// The content file's modification time
    pub mod_time: Option<DateTime<FixedOffset>>,
    /// The Git author date, if known
    pub git_author_date: Option<DateTime<FixedOffset>>,
    /// Location used for dates without zone information
    pub location: FixedOffset,

    pub params: &'a mut Map<String, Value>,
    pub dates: &'a mut Dates,
    pub page_urls: &'a mut UrlPath,
}

impl FrontMatterDescriptor<'_> {
    /// Case-insensitive front matter lookup
    fn lookup(&self, key: &str) -> Option<&Value> {
        self.frontmatter.get(key).or_else(|| {
            self.frontmatter
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Params hold JSON values, so the date is stored as an RFC 3339 string.
    /// Use [`Dates`] for the typed value.
    fn set_param_if_not_set(&mut self, key: &str, value: DateTime<FixedOffset>) {
        if self.params.contains_key(key) {
            return;
        }
        self.params
            .insert(key.to_string(), Value::String(value.to_rfc3339()));
    }
}

/// One source a date may come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateHandler {
    /// A front matter key
    Field(String),
    /// A `YYYY-MM-DD` prefix of the base filename
    Filename,
    /// The file modification time
    ModTime,
    /// The Git author date
    GitAuthorDate,
}

impl DateHandler {
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier {
            FM_FILENAME => DateHandler::Filename,
            FM_MODTIME => DateHandler::ModTime,
            FM_GIT_AUTHOR_DATE => DateHandler::GitAuthorDate,
            key => DateHandler::Field(key.to_string()),
        }
    }

    /// Try to set `field` on the descriptor. `Ok(true)` if this handler
    /// produced the value.
    pub fn handle(
        &self,
        d: &mut FrontMatterDescriptor<'_>,
        field: DateField,
        parser: &dyn DateParser,
    ) -> Result<bool, FrontMatterError> {
        match self {
            DateHandler::Field(key) => {
                let Some(value) = d.lookup(key) else {
                    return Ok(false);
                };
                if let Some(kind) = container_kind(value) {
                    return Err(FrontMatterError::NotADate {
                        key: key.clone(),
                        kind,
                    });
                }
                let date = match parser.parse(value, d.location) {
                    Ok(date) => date,
                    Err(e) => {
                        debug!("front matter {:?}: {}", key, e);
                        return Ok(false);
                    }
                };

                // Several keys map to one date, e.g. "expirydate" and
                // "unpublishdate" both set the expiry date (first found), but
                // each is kept in params under its own name.
                d.dates.set(field, date);
                d.set_param_if_not_set(key, date);
                Ok(true)
            }
            DateHandler::Filename => {
                let Some((date, slug)) =
                    date_and_slug_from_base_filename(d.location, d.base_filename)
                else {
                    return Ok(false);
                };
                d.dates.set(field, date);
                if d.lookup("slug").is_none() {
                    d.page_urls.slug = slug;
                }
                Ok(true)
            }
            DateHandler::ModTime => {
                let mod_time = d.mod_time;
                Ok(set_if_some(d, field, mod_time))
            }
            DateHandler::GitAuthorDate => {
                let author_date = d.git_author_date;
                Ok(set_if_some(d, field, author_date))
            }
        }
    }
}

fn set_if_some(
    d: &mut FrontMatterDescriptor<'_>,
    field: DateField,
    value: Option<DateTime<FixedOffset>>,
) -> bool {
    match value {
        Some(date) => {
            d.dates.set(field, date);
            true
        }
        None => false,
    }
}

fn container_kind(value: &Value) -> Option<&'static str> {
    match value {
        Value::Array(_) => Some("list"),
        Value::Object(_) => Some("map"),
        _ => None,
    }
}

/// The ordered handlers for one date field. First handler to succeed wins.
#[derive(Debug, Clone)]
pub struct DateChain {
    field: DateField,
    handlers: Vec<DateHandler>,
}

impl DateChain {
    pub fn new(field: DateField, identifiers: &[String]) -> Self {
        Self {
            field,
            handlers: identifiers
                .iter()
                .map(|id| DateHandler::from_identifier(id))
                .collect(),
        }
    }

    pub fn field(&self) -> DateField {
        self.field
    }

    pub fn handlers(&self) -> &[DateHandler] {
        &self.handlers
    }

    /// Run the handlers in order. Handler errors are logged and skipped.
    pub fn resolve(&self, d: &mut FrontMatterDescriptor<'_>, parser: &dyn DateParser) -> bool {
        for handler in &self.handlers {
            match handler.handle(d, self.field, parser) {
                Ok(true) => {
                    debug!("{}: resolved by {:?}", self.field.key(), handler);
                    return true;
                }
                Ok(false) => {}
                Err(e) => error!("{}: {}", self.field.key(), e),
            }
        }
        debug!("{}: no handler matched", self.field.key());
        false
    }
}

/// Date and slug from a Jekyll style filename (`YYYY-MM-DD-slug.md`).
///
/// The name without extension must be at least 10 characters, the first 10
/// of which form the date. The rest, trimmed of spaces, hyphens and
/// underscores, is the slug.
pub fn date_and_slug_from_base_filename(
    location: FixedOffset,
    name: &str,
) -> Option<(DateTime<FixedOffset>, String)> {
    let without_ext = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    let date_part = without_ext.get(..10)?;
    let date = parse::parse_date(date_part, location).ok()?;

    // Be a little lenient with the format here.
    let slug = without_ext[10..].trim_matches(|c| c == ' ' || c == '-' || c == '_');

    Some((date, slug.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::parse::DefaultDateParser;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    struct Page {
        frontmatter: Map<String, Value>,
        params: Map<String, Value>,
        dates: Dates,
        urls: UrlPath,
    }

    impl Page {
        fn new(frontmatter: Value) -> Self {
            let Value::Object(frontmatter) = frontmatter else {
                panic!("front matter must be an object");
            };
            Self {
                frontmatter,
                params: Map::new(),
                dates: Dates::default(),
                urls: UrlPath::default(),
            }
        }

        fn descriptor<'a>(&'a mut self, filename: &'a str) -> FrontMatterDescriptor<'a> {
            FrontMatterDescriptor {
                frontmatter: &self.frontmatter,
                base_filename: filename,
                mod_time: None,
                git_author_date: None,
                location: utc(),
                params: &mut self.params,
                dates: &mut self.dates,
                page_urls: &mut self.urls,
            }
        }
    }

    #[test]
    fn test_date_and_slug_from_filename() {
        let (date, slug) = date_and_slug_from_base_filename(utc(), "2018-02-22-mypage.md").unwrap();
        assert_eq!(date, ts("2018-02-22T00:00:00+00:00"));
        assert_eq!(slug, "mypage");

        let (_, slug) = date_and_slug_from_base_filename(utc(), "2018-02-22_ my page _.md").unwrap();
        assert_eq!(slug, "my page");

        let (_, slug) = date_and_slug_from_base_filename(utc(), "2018-02-22.md").unwrap();
        assert_eq!(slug, "");

        assert!(date_and_slug_from_base_filename(utc(), "short.md").is_none());
        assert!(date_and_slug_from_base_filename(utc(), "not-a-date-page.md").is_none());
    }

    #[test]
    fn test_filename_date_uses_location() {
        let loc = FixedOffset::west_opt(5 * 3600).unwrap();
        let (date, _) = date_and_slug_from_base_filename(loc, "2018-02-22-x.md").unwrap();
        assert_eq!(date, ts("2018-02-22T00:00:00-05:00"));
    }

    #[test]
    fn test_field_handler_sets_date_and_own_param() {
        let mut page = Page::new(json!({ "unpublishdate": "2030-01-01" }));
        let mut d = page.descriptor("page.md");
        let handler = DateHandler::Field("unpublishdate".to_string());
        assert!(handler.handle(&mut d, DateField::ExpiryDate, &DefaultDateParser).unwrap());

        assert_eq!(page.dates.expiry_date, Some(ts("2030-01-01T00:00:00+00:00")));
        assert_eq!(page.params["unpublishdate"], json!("2030-01-01T00:00:00+00:00"));
        assert!(!page.params.contains_key("expirydate"));
    }

    #[test]
    fn test_field_handler_unparseable_is_no_match() {
        let mut page = Page::new(json!({ "date": "tomorrow-ish" }));
        let mut d = page.descriptor("page.md");
        let handler = DateHandler::Field("date".to_string());
        assert!(!handler.handle(&mut d, DateField::Date, &DefaultDateParser).unwrap());
        assert_eq!(page.dates, Dates::default());
        assert!(page.params.is_empty());
    }

    #[test]
    fn test_field_handler_container_is_error() {
        let mut page = Page::new(json!({ "date": ["2020-01-01"] }));
        let mut d = page.descriptor("page.md");
        let handler = DateHandler::Field("date".to_string());
        assert!(handler.handle(&mut d, DateField::Date, &DefaultDateParser).is_err());
    }

    #[test]
    fn test_field_handler_does_not_overwrite_param() {
        let mut page = Page::new(json!({ "date": "2020-01-01" }));
        page.params.insert("date".to_string(), json!("kept"));
        let mut d = page.descriptor("page.md");
        let handler = DateHandler::Field("date".to_string());
        assert!(handler.handle(&mut d, DateField::Date, &DefaultDateParser).unwrap());
        assert_eq!(page.params["date"], json!("kept"));
        assert_eq!(page.dates.date, Some(ts("2020-01-01T00:00:00+00:00")));
    }

    #[test]
    fn test_filename_handler_respects_explicit_slug() {
        let mut page = Page::new(json!({ "slug": "custom" }));
        let mut d = page.descriptor("2018-02-22-mypage.md");
        assert!(DateHandler::Filename.handle(&mut d, DateField::Date, &DefaultDateParser).unwrap());
        assert_eq!(page.urls.slug, "");
        assert_eq!(page.dates.date, Some(ts("2018-02-22T00:00:00+00:00")));

        let mut page = Page::new(json!({}));
        let mut d = page.descriptor("2018-02-22-mypage.md");
        assert!(DateHandler::Filename.handle(&mut d, DateField::Date, &DefaultDateParser).unwrap());
        assert_eq!(page.urls.slug, "mypage");
    }

    #[test]
    fn test_modtime_and_git_handlers() {
        let mut page = Page::new(json!({}));
        let mut d = page.descriptor("page.md");
        assert!(!DateHandler::ModTime.handle(&mut d, DateField::Lastmod, &DefaultDateParser).unwrap());
        assert!(!DateHandler::GitAuthorDate.handle(&mut d, DateField::Lastmod, &DefaultDateParser).unwrap());

        d.mod_time = Some(ts("2021-03-04T05:06:07+00:00"));
        assert!(DateHandler::ModTime.handle(&mut d, DateField::Lastmod, &DefaultDateParser).unwrap());
        d.git_author_date = Some(ts("2022-01-01T00:00:00+00:00"));
        assert!(DateHandler::GitAuthorDate.handle(&mut d, DateField::PublishDate, &DefaultDateParser).unwrap());

        assert_eq!(page.dates.lastmod, Some(ts("2021-03-04T05:06:07+00:00")));
        assert_eq!(page.dates.publish_date, Some(ts("2022-01-01T00:00:00+00:00")));
        assert!(page.params.is_empty());
    }

    #[test]
    fn test_chain_first_match_wins_and_skips_errors() {
        let mut page = Page::new(json!({
            "date": { "nested": true },
            "pubdate": "bad",
            "published": "2019-05-05",
            "lastmod": "2020-01-01"
        }));
        let chain = DateChain::new(
            DateField::PublishDate,
            &["date".into(), "pubdate".into(), "published".into(), "lastmod".into()],
        );
        let mut d = page.descriptor("page.md");
        assert!(chain.resolve(&mut d, &DefaultDateParser));
        assert_eq!(page.dates.publish_date, Some(ts("2019-05-05T00:00:00+00:00")));
        assert!(page.params.contains_key("published"));
        assert!(!page.params.contains_key("lastmod"));
    }

    #[test]
    fn test_chain_no_match_leaves_zero() {
        let mut page = Page::new(json!({}));
        let chain = DateChain::new(DateField::ExpiryDate, &["expirydate".into(), ":git".into()]);
        let mut d = page.descriptor("page.md");
        assert!(!chain.resolve(&mut d, &DefaultDateParser));
        assert_eq!(page.dates.expiry_date, None);
    }

    #[test]
    fn test_handler_from_identifier() {
        assert_eq!(DateHandler::from_identifier(":filename"), DateHandler::Filename);
        assert_eq!(DateHandler::from_identifier(":filemodtime"), DateHandler::ModTime);
        assert_eq!(DateHandler::from_identifier(":git"), DateHandler::GitAuthorDate);
        assert_eq!(
            DateHandler::from_identifier("mydate"),
            DateHandler::Field("mydate".to_string())
        );
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut page = Page::new(json!({ "PublishDate": "2020-02-02" }));
        let mut d = page.descriptor("page.md");
        let handler = DateHandler::Field("publishdate".to_string());
        assert!(handler.handle(&mut d, DateField::PublishDate, &DefaultDateParser).unwrap());
        assert!(page.params.contains_key("publishdate"));
    }
}
