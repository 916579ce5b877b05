//! Moodle web-services client. Resolves a book module and pulls its chapters over the REST API.

mod client;
mod error;
#[cfg(test)]
pub(crate) mod fake;

pub(crate) use client::DEFAULT_TIMEOUT_SECS;
pub use client::{HttpResponse, HttpTransport, HttpTransportBuilder, Transport};
pub use error::MoodleError;

use crate::config::MoodleConfig;
use crate::model::{BookId, Chapter};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

const REST_PATH: &str = "/webservice/rest/server.php";

/// Moodle error codes that mean the token was rejected or lacks capability.
const AUTH_ERROR_CODES: &[&str] = &[
    "invalidtoken",
    "accessexception",
    "nopermissions",
    "requireloginerror",
];

/// Moodle error codes that mean the requested record does not exist.
const NOT_FOUND_ERROR_CODES: &[&str] = &[
    "invalidrecord",
    "invalidrecordunknown",
    "invalidcoursemodule",
    "invalidcourseid",
];

#[derive(Debug, Deserialize)]
struct CourseModuleResponse {
    cm: CourseModule,
}

#[derive(Debug, Deserialize)]
struct CourseModule {
    course: u64,
    instance: u64,
    modname: String,
}

#[derive(Debug, Deserialize)]
struct CourseSection {
    #[serde(default)]
    modules: Vec<SectionModule>,
}

#[derive(Debug, Deserialize)]
struct SectionModule {
    modname: String,
    #[serde(default)]
    instance: Option<u64>,
    #[serde(default)]
    contents: Vec<ModuleContent>,
}

/// One entry of a module's `contents`. For books: a `structure` entry plus one `index.html` per chapter.
#[derive(Debug, Deserialize)]
struct ModuleContent {
    filename: String,
    #[serde(default)]
    filepath: Option<String>,
    #[serde(default)]
    fileurl: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Node of the book's table of contents (the decoded `structure` entry).
#[derive(Debug, Deserialize)]
struct StructureItem {
    title: String,
    href: String,
    #[serde(default)]
    level: u32,
    #[serde(default)]
    subitems: Vec<StructureItem>,
}

/// Client for one Moodle site. Configuration is passed in explicitly; HTTP goes through `T`.
pub struct MoodleClient<T: Transport> {
    ws_url: String,
    token: String,
    transport: T,
}

impl<T: Transport> MoodleClient<T> {
    pub fn new(config: &MoodleConfig, transport: T) -> Self {
        Self {
            ws_url: format!("{}{}", config.url.trim_end_matches('/'), REST_PATH),
            token: config.token.clone(),
            transport,
        }
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Resolve the book's instance id from its view URL and course URL.
    pub fn resolve_book(&mut self, course_url: &str, book_url: &str) -> Result<BookId, MoodleError> {
        let course_id = extract_id(course_url)?;
        let cmid = extract_id(book_url)?;
        let value = self.call(
            "core_course_get_course_module",
            &[("cmid", cmid.to_string())],
        )?;
        let response: CourseModuleResponse = decode(value, "core_course_get_course_module")?;
        let cm = response.cm;
        if cm.modname != "book" {
            return Err(MoodleError::NotFound {
                message: format!("course module {} is a {}, not a book", cmid, cm.modname),
            });
        }
        if cm.course != course_id {
            return Err(MoodleError::NotFound {
                message: format!(
                    "book module {} belongs to course {}, not course {}",
                    cmid, cm.course, course_id
                ),
            });
        }
        log::debug!("Resolved book module {} to instance {}", cmid, cm.instance);
        Ok(BookId {
            course_id,
            cmid,
            instance: cm.instance,
        })
    }

    /// Fetch every chapter of the book, subchapters included, in book order.
    pub fn list_chapters(&mut self, book: &BookId) -> Result<Vec<Chapter>, MoodleError> {
        const FUNCTION: &str = "core_course_get_contents";
        let value = self.call(FUNCTION, &[("courseid", book.course_id.to_string())])?;
        let sections: Vec<CourseSection> = decode(value, FUNCTION)?;
        let module = sections
            .into_iter()
            .flat_map(|s| s.modules)
            .find(|m| m.modname == "book" && m.instance == Some(book.instance))
            .ok_or_else(|| MoodleError::NotFound {
                message: format!(
                    "book instance {} not found in contents of course {}",
                    book.instance, book.course_id
                ),
            })?;

        let structure = module
            .contents
            .iter()
            .find(|c| c.filename == "structure")
            .and_then(|c| c.content.as_deref())
            .ok_or_else(|| schema(FUNCTION, "book module has no structure entry"))?;
        let items: Vec<StructureItem> = serde_json::from_str(structure)
            .map_err(|e| schema(FUNCTION, format!("invalid book structure: {}", e)))?;

        let mut flat = Vec::new();
        flatten(&items, &mut flat);

        let mut chapters = Vec::with_capacity(flat.len());
        for (i, item) in flat.into_iter().enumerate() {
            let id = chapter_id_from_href(&item.href)
                .ok_or_else(|| schema(FUNCTION, format!("bad chapter href '{}'", item.href)))?;
            let id_str = id.to_string();
            let entry = module
                .contents
                .iter()
                .find(|c| {
                    c.filename == "index.html"
                        && c.filepath.as_deref().map(|p| p.trim_matches('/'))
                            == Some(id_str.as_str())
                })
                .ok_or_else(|| {
                    schema(FUNCTION, format!("no index.html entry for chapter {}", id))
                })?;
            let file_url = entry
                .fileurl
                .clone()
                .ok_or_else(|| schema(FUNCTION, format!("chapter {} has no fileurl", id)))?;
            // The index.html entry carries the title run through format_string (HTML-escaped).
            let title = entry
                .content
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(item.title.as_str());
            let title = html_escape::decode_html_entities(title).into_owned();

            log::debug!("Fetching chapter {} ({})", id, title);
            let content = self.fetch_chapter_body(&file_url)?;
            chapters.push(Chapter {
                id,
                title,
                content,
                order: i as u32 + 1,
                level: item.level,
                href: item.href.clone(),
                file_url: Some(file_url),
            });
        }
        log::info!(
            "Fetched {} chapter(s) of book {}",
            chapters.len(),
            book.instance
        );
        Ok(chapters)
    }

    /// Upload a chapter back to Moodle. Not implemented: always fails and sends nothing.
    pub fn push_chapter(&mut self, book: &BookId, chapter: &Chapter) -> Result<(), MoodleError> {
        log::debug!(
            "Refusing push of chapter {} to book {}",
            chapter.id,
            book.instance
        );
        Err(MoodleError::NotImplemented {
            operation: "push_chapter",
        })
    }

    fn call(&mut self, wsfunction: &str, params: &[(&str, String)]) -> Result<Value, MoodleError> {
        let mut form = vec![
            ("wstoken".to_string(), self.token.clone()),
            ("moodlewsrestformat".to_string(), "json".to_string()),
            ("wsfunction".to_string(), wsfunction.to_string()),
        ];
        form.extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));
        log::debug!("Calling {} with {:?}", wsfunction, params);

        let response = self.transport.post_form(&self.ws_url, &form)?;
        check_status(&response, &self.ws_url)?;
        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| schema(wsfunction, format!("invalid JSON: {}", e)))?;
        if let Some(err) = moodle_exception(&value) {
            return Err(err);
        }
        Ok(value)
    }

    fn fetch_chapter_body(&mut self, file_url: &str) -> Result<String, MoodleError> {
        let mut url = Url::parse(file_url).map_err(|e| MoodleError::InvalidUrl {
            input: file_url.to_string(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("token", &self.token);
        let response = self.transport.get(url.as_str())?;
        check_status(&response, &client::redact_url(file_url))?;
        // pluginfile.php reports errors as a JSON object even with status 200.
        if response.body.trim_start().starts_with('{') {
            if let Ok(value) = serde_json::from_str::<Value>(&response.body) {
                if let Some(err) = moodle_exception(&value) {
                    return Err(err);
                }
            }
        }
        Ok(response.body)
    }
}

fn check_status(response: &HttpResponse, url: &str) -> Result<(), MoodleError> {
    if response.is_success() {
        return Ok(());
    }
    match response.status {
        401 | 403 => Err(MoodleError::Auth {
            message: format!("HTTP {} from {}", response.status, url),
        }),
        status => Err(MoodleError::HttpStatus {
            status,
            url: url.to_string(),
        }),
    }
}

/// Classify a Moodle error payload (`{"exception": .., "errorcode": .., "message": ..}`).
fn moodle_exception(value: &Value) -> Option<MoodleError> {
    let obj = value.as_object()?;
    let errorcode = obj.get("errorcode").and_then(Value::as_str)?;
    if !obj.contains_key("exception") && !obj.contains_key("error") && !obj.contains_key("message")
    {
        return None;
    }
    let message = obj
        .get("message")
        .or_else(|| obj.get("error"))
        .and_then(Value::as_str)
        .unwrap_or(errorcode)
        .to_string();
    Some(if AUTH_ERROR_CODES.contains(&errorcode) {
        MoodleError::Auth { message }
    } else if NOT_FOUND_ERROR_CODES.contains(&errorcode) {
        MoodleError::NotFound { message }
    } else {
        MoodleError::Remote {
            errorcode: errorcode.to_string(),
            message,
        }
    })
}

fn decode<D: DeserializeOwned>(value: Value, context: &str) -> Result<D, MoodleError> {
    serde_json::from_value(value).map_err(|e| schema(context, e.to_string()))
}

fn schema(context: &str, message: impl Into<String>) -> MoodleError {
    MoodleError::Schema {
        context: context.to_string(),
        message: message.into(),
    }
}

fn flatten<'a>(items: &'a [StructureItem], out: &mut Vec<&'a StructureItem>) {
    for item in items {
        out.push(item);
        flatten(&item.subitems, out);
    }
}

/// `12/index.html` -> 12
fn chapter_id_from_href(href: &str) -> Option<u64> {
    href.trim_start_matches('/').split('/').next()?.parse().ok()
}

/// Read the numeric `id` query parameter of a Moodle view URL.
pub fn extract_id(url: &str) -> Result<u64, MoodleError> {
    let parsed = Url::parse(url).map_err(|e| MoodleError::InvalidUrl {
        input: url.to_string(),
        reason: e.to_string(),
    })?;
    let id = parsed
        .query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| MoodleError::InvalidUrl {
            input: url.to_string(),
            reason: "missing 'id' query parameter".to_string(),
        })?;
    id.parse().map_err(|_| MoodleError::InvalidUrl {
        input: url.to_string(),
        reason: format!("'id' is not a number: {}", id),
    })
}
