//! DSN parsing.
//!
//! Every dialect accepts a URI-shaped DSN,
//! `<scheme>://[user[:password]@]host[:port][/database][?key=value&...]`,
//! and turns it into whatever its native driver expects. The shared pieces
//! live here: the [`DsnParser`] contract, a tolerant URI splitter
//! ([`DsnParts`]) and password obfuscation for logs and errors.

mod hadb;
mod mysql;
mod postgres;
mod sqlite;

pub use hadb::HadbDsnParser;
pub use mysql::MySqlDsnParser;
pub use postgres::PostgresDsnParser;
pub use sqlite::SqliteDsnParser;

use crate::error::{ConnectorError, ConnectorResult};
use crate::models::DialectId;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Characters escaped in URL userinfo and path segments.
const URL_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Query key reserved for the native driver name.
pub const DRIVER_PARAM: &str = "driver";

/// Per-dialect DSN parser.
pub trait DsnParser: Send + Sync + std::fmt::Debug {
    fn dialect(&self) -> DialectId;

    /// Accepted URI schemes, canonical one first.
    fn schemes(&self) -> &'static [&'static str];

    /// Canonical example used in error messages. Never parsed.
    fn sample_dsn(&self) -> &'static str;

    /// Cheap syntactic check on the scheme prefix. Never fails.
    fn is_valid_dsn(&self, dsn: &str) -> bool {
        match dsn.trim().split_once("://") {
            Some((scheme, _)) => self
                .schemes()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(scheme)),
            None => false,
        }
    }

    /// Map the DSN to the native connection string.
    fn parse(&self, dsn: &str) -> ConnectorResult<NativeConnectionString>;

    /// Validate the scheme and split the DSN into its components.
    fn split(&self, dsn: &str) -> ConnectorResult<DsnParts> {
        if !self.is_valid_dsn(dsn) {
            return Err(self.format_error(dsn, "unrecognized scheme".to_string()));
        }
        DsnParts::parse(dsn).map_err(|message| self.format_error(dsn, message))
    }

    /// Build a format error carrying the obfuscated DSN and the sample.
    fn format_error(&self, dsn: &str, message: String) -> ConnectorError {
        format_error(self.sample_dsn(), dsn, message)
    }
}

/// Build a format error for `dsn`. The password never reaches the message.
pub fn format_error(sample: &str, dsn: &str, message: impl Into<String>) -> ConnectorError {
    ConnectorError::dsn_format(message, obfuscate_dsn(dsn), sample)
}

/// Parser for a dialect. Every parser is compiled regardless of features.
pub fn parser_for(dialect: DialectId) -> &'static dyn DsnParser {
    static HADB: HadbDsnParser = HadbDsnParser;
    static MYSQL: MySqlDsnParser = MySqlDsnParser;
    static POSTGRES: PostgresDsnParser = PostgresDsnParser;
    static SQLITE: SqliteDsnParser = SqliteDsnParser;

    match dialect {
        DialectId::Hadb => &HADB,
        DialectId::MySql => &MYSQL,
        DialectId::Postgres => &POSTGRES,
        DialectId::Sqlite => &SQLITE,
    }
}

/// Components of a DSN.
///
/// Credentials may contain `@`, `:`, `/` and `?` unescaped: the userinfo
/// ends at the last `@` before the query string. When the password itself
/// contains `?` (and neither `/` nor `=` before that `@`), it ends at the
/// last `@` overall. User names cannot contain `:`.
/// Percent-escapes in credentials and the database name are decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct DsnParts {
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Host without IPv6 brackets
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    /// Query pairs in source order
    pub params: Vec<(String, String)>,
}

impl DsnParts {
    pub fn parse(dsn: &str) -> Result<Self, String> {
        let dsn = dsn.trim();
        let (scheme, rest) = dsn
            .split_once("://")
            .ok_or_else(|| "missing '<scheme>://' prefix".to_string())?;
        if scheme.is_empty() {
            return Err("empty scheme".to_string());
        }

        let (userinfo, location) = match userinfo_end(rest) {
            Some(at) => (Some(&rest[..at]), &rest[at + 1..]),
            None => (None, rest),
        };

        let (user, password) = match userinfo {
            Some(info) => {
                let (user, password) = match info.split_once(':') {
                    Some((user, password)) => (user, Some(password)),
                    None => (info, None),
                };
                (
                    Some(decode(user)).filter(|u| !u.is_empty()),
                    password.map(decode),
                )
            }
            None => (None, None),
        };

        let (location, query) = match location.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (location, None),
        };
        let (host_port, path) = match location.split_once('/') {
            Some((host_port, path)) => (host_port, Some(path)),
            None => (location, None),
        };
        let (host, port) = split_host_port(host_port)?;
        let database = path
            .map(|p| decode(p.trim_start_matches('/')))
            .filter(|db| !db.is_empty());
        let params = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            user,
            password,
            host,
            port,
            database,
            params,
        })
    }

    /// First value of a query key (case-insensitive).
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Query pairs except the given reserved keys.
    pub fn params_except<'a>(
        &'a self,
        reserved: &'a [&'a str],
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.params
            .iter()
            .filter(move |(k, _)| !reserved.iter().any(|r| r.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Host as it must appear in a URL authority (IPv6 re-bracketed).
    pub fn url_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl std::fmt::Debug for DsnParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsnParts")
            .field("scheme", &self.scheme)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("params", &self.params)
            .finish()
    }
}

/// Byte offset of the `@` closing the userinfo, if any.
fn userinfo_end(rest: &str) -> Option<usize> {
    let Some(q) = rest.find('?') else {
        return rest.rfind('@');
    };
    if let Some(at) = rest[..q].rfind('@') {
        return Some(at);
    }
    // Either the password holds a `?` or the query holds an `@`. Only the
    // former leaves `user:pass` with no path or query pair before the `@`.
    let at = rest.rfind('@')?;
    let before_query = &rest[..q];
    let in_password = before_query.contains(':')
        && !before_query.contains('/')
        && !rest[q..at].contains(['=', '&']);
    in_password.then_some(at)
}

/// Query and ODBC keys whose values are secrets.
const SECRET_KEYS: &[&str] = &["pwd", "password"];

fn is_secret_key(key: &str) -> bool {
    let key = key.trim();
    SECRET_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn split_host_port(host_port: &str) -> Result<(String, Option<u16>), String> {
    if let Some(bracketed) = host_port.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| "unterminated IPv6 host".to_string())?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(parse_port(port)?),
            None if after.is_empty() => None,
            None => return Err(format!("unexpected text after host: '{after}'")),
        };
        return Ok((host.to_string(), port));
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((host_port.to_string(), None)),
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    port.parse().map_err(|_| format!("invalid port '{port}'"))
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Reassemble `parts` as a driver URL under `scheme`, re-encoding
/// credentials and dropping `reserved` query keys.
pub fn build_url(scheme: &str, parts: &DsnParts, reserved: &[&str]) -> Result<String, String> {
    let mut url = format!("{scheme}://");
    if parts.user.is_some() || parts.password.is_some() {
        if let Some(user) = &parts.user {
            url.extend(utf8_percent_encode(user, URL_COMPONENT));
        }
        if let Some(password) = &parts.password {
            url.push(':');
            url.extend(utf8_percent_encode(password, URL_COMPONENT));
        }
        url.push('@');
    }
    url.push_str(&parts.url_host());
    if let Some(port) = parts.port {
        url.push_str(&format!(":{port}"));
    }
    if let Some(database) = &parts.database {
        url.push('/');
        url.extend(utf8_percent_encode(database, URL_COMPONENT));
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(parts.params_except(reserved))
        .finish();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }
    url::Url::parse(&url).map_err(|e| format!("invalid URL: {e}"))?;
    Ok(url)
}

/// Replace the password portion of a DSN with `****`, including `pwd` and
/// `password` query values.
///
/// Works on malformed input too, so it can be applied to whatever a caller
/// passed in before it is logged or echoed in an error.
pub fn obfuscate_dsn(dsn: &str) -> String {
    let (prefix, rest) = match dsn.find("://") {
        Some(pos) => dsn.split_at(pos + 3),
        None => ("", dsn),
    };
    let (userinfo, location) = match userinfo_end(rest) {
        Some(at) => rest.split_at(at),
        None => ("", rest),
    };
    let userinfo = match userinfo.split_once(':') {
        Some((user, _)) => format!("{user}:****"),
        None => userinfo.to_string(),
    };
    let location = match location.split_once('?') {
        Some((path, query)) => format!("{path}?{}", mask_query_secrets(query)),
        None => location.to_string(),
    };
    format!("{prefix}{userinfo}{location}")
}

fn mask_query_secrets(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_secret_key(key) => format!("{key}=****"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Native connection string handed to the driver.
///
/// `Debug` and `Display` mask the password so the value can be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct NativeConnectionString {
    inner: String,
    database: Option<String>,
}

impl NativeConnectionString {
    pub fn new(inner: impl Into<String>, database: Option<String>) -> Self {
        Self {
            inner: inner.into(),
            database,
        }
    }

    /// The unmasked string. Only pass this to the driver.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Database named in the DSN path, if any.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Password-masked rendering.
    pub fn masked(&self) -> String {
        if self.inner.contains("://") {
            obfuscate_dsn(&self.inner)
        } else {
            mask_odbc_password(&self.inner)
        }
    }
}

impl std::fmt::Display for NativeConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.masked())
    }
}

impl std::fmt::Debug for NativeConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeConnectionString")
            .field("inner", &self.masked())
            .field("database", &self.database)
            .finish()
    }
}

/// Quote an ODBC attribute value when it would otherwise break the
/// `KEY=value;` syntax.
pub fn odbc_value(value: &str) -> String {
    if value.contains(';') || value.starts_with('{') || value.contains('}') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

/// Split `KEY=value;` pairs, honouring `{...}` quoted values.
fn odbc_pairs(s: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            pairs.push((rest, ""));
            break;
        };
        let key = &rest[..eq];
        let value_start = &rest[eq + 1..];
        let value_len = if value_start.starts_with('{') {
            quoted_len(value_start)
        } else {
            value_start.find(';').unwrap_or(value_start.len())
        };
        pairs.push((key, &value_start[..value_len]));
        rest = value_start[value_len..]
            .strip_prefix(';')
            .unwrap_or(&value_start[value_len..]);
    }
    pairs
}

/// Length of a `{...}` value including braces; `}}` is an escaped brace.
fn quoted_len(value: &str) -> usize {
    let bytes = value.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'}' {
            if bytes.get(i + 1) == Some(&b'}') {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    value.len()
}

fn mask_odbc_password(s: &str) -> String {
    odbc_pairs(s)
        .into_iter()
        .map(|(key, value)| {
            if is_secret_key(key) {
                format!("{key}=****;")
            } else {
                format!("{key}={value};")
            }
        })
        .collect()
}
