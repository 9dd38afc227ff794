use envelo_core::Parameters;
use serde_json::{Value, json};

/// Exit codes: 0=success (2xx), 1=client error (4xx) or blocked action,
///             2=server error (5xx), 3=connection error, 4=usage error
pub const EXIT_OK: i32 = 0;
pub const EXIT_CLIENT: i32 = 1;
pub const EXIT_SERVER: i32 = 2;
pub const EXIT_CONNECTION: i32 = 3;
pub const EXIT_USAGE: i32 = 4;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn print_json(value: &Value, to_stderr: bool) {
    let formatted = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    if to_stderr {
        eprintln!("{formatted}");
    } else {
        println!("{formatted}");
    }
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    print_json(&err, true);
    std::process::exit(EXIT_USAGE);
}

pub fn status_exit_code(status: u16) -> i32 {
    match status {
        200..=299 => EXIT_OK,
        400..=499 => EXIT_CLIENT,
        _ => EXIT_SERVER,
    }
}

/// Why a request produced no HTTP response at all.
#[derive(Debug)]
pub enum RequestFailure {
    InvalidUrl(String),
    Connection(String),
}

impl RequestFailure {
    /// Print the structured error and return its exit code.
    pub fn report(&self, hint: &str) -> i32 {
        match self {
            RequestFailure::InvalidUrl(message) => {
                print_json(&json!({"error": "cli_error", "message": message}), true);
                EXIT_USAGE
            }
            RequestFailure::Connection(message) => {
                print_json(
                    &json!({
                        "error": "connection_error",
                        "message": message,
                        "docs_hint": hint
                    }),
                    true,
                );
                EXIT_CONNECTION
            }
        }
    }
}

/// Send one request and return the status and JSON body (no printing).
pub async fn send_request(
    base_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> Result<(u16, Value), RequestFailure> {
    let base = base_url.trim_end_matches('/');
    let url = reqwest::Url::parse(&format!("{base}{path}"))
        .map_err(|e| RequestFailure::InvalidUrl(format!("Invalid URL: {base}{path}: {e}")))?;

    let mut req = client().request(method, url);
    if let Some(t) = token {
        req = req.bearer_auth(t);
    }
    if let Some(b) = body {
        req = req.json(b);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| RequestFailure::Connection(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };
    Ok((status, body))
}

/// Execute a request, print the response, and return the structured exit code.
pub async fn api_request(
    base_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
    connection_hint: &str,
) -> i32 {
    match send_request(base_url, method, path, token, body.as_ref()).await {
        Ok((status, body)) => {
            let code = status_exit_code(status);
            print_json(&body, code != EXIT_OK);
            code
        }
        Err(failure) => failure.report(connection_hint),
    }
}

/// Print a successful result, to stderr when `code` signals failure.
pub fn emit(value: &Value, code: i32) -> i32 {
    print_json(value, code != EXIT_OK);
    code
}

/// Parse repeated `-p name=value` flags into a parameter map.
pub fn parse_params(pairs: &[String]) -> Result<Parameters, String> {
    let mut params = Parameters::new();
    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid parameter '{pair}': expected name=value"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("Invalid parameter '{pair}': name is empty"));
        }
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| format!("Invalid parameter '{pair}': '{raw}' is not a number"))?;
        if !value.is_finite() {
            return Err(format!("Invalid parameter '{pair}': value must be finite"));
        }
        if params.insert(name.to_string(), value).is_some() {
            return Err(format!("Parameter '{name}' given more than once"));
        }
    }
    Ok(params)
}

/// Read JSON from a file path or stdin (when path is "-").
pub fn read_json_from_file(path: &str) -> Result<Value, String> {
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin())
            .map_err(|e| format!("Failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}
