//! Fallback handlers: the not-found chain and the last error handler.

use serde_json::json;

use crate::http::{content_types, headers};
use crate::logging::Logger;

use super::{ErrorMiddleware, Flow, Middleware};

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A minimal page showing `text` preformatted
pub fn to_html(text: &str, title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(title),
        escape_html(text)
    )
}

fn not_found_message(method: &str, url: &str) -> String {
    format!("Cannot {} {}", method.to_ascii_uppercase(), url)
}

/// 404 with `Cannot METHOD /url`, as JSON `{status, err}` or an HTML page
pub fn not_found_handler(prefer_json: bool, logger: Logger) -> Middleware {
    Middleware::sync(move |req, res| {
        let message = not_found_message(req.method_str(), req.url());
        logger.info(&message);

        res.status(404);
        if prefer_json {
            res.json(&json!({ "status": 404, "err": message }))?;
        } else {
            res.set(headers::CONTENT_TYPE, content_types::HTML);
            res.end(to_html(&message, "Not found"));
        }
        Ok(Flow::Halt)
    })
}

/// 500 with the error, as JSON `{err}` or an HTML page with its chain of causes
pub fn error_handler(prefer_json: bool, logger: Logger) -> ErrorMiddleware {
    ErrorMiddleware::sync(move |err, _req, res| {
        logger.error(format_args!("{:#}", err));

        if res.is_finished() {
            return Ok(Flow::Halt);
        }
        res.status(500);
        if prefer_json {
            res.json(&json!({ "err": err.to_string() }))?;
        } else {
            res.set(headers::CONTENT_TYPE, content_types::HTML);
            res.end(to_html(&format!("{:?}", err), "Error"));
        }
        Ok(Flow::Halt)
    })
}
