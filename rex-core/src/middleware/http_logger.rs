//! Access log middleware, morgan-style.
//!
//! Logs `date ip METHOD url status N.NN ms` on the logger's info channel once
//! the response has been written. Formatting every request costs time even
//! when the info channel is off, so prefer it in development.

use std::time::Instant;

use crate::logging::Logger;

use super::{Flow, Middleware};

pub fn http_logger(logger: Logger) -> Middleware {
    if std::env::var("REX_ENV").is_ok_and(|env| env == "production") {
        logger.warn(
            "You are using the http logger middleware in production mode which may decrease the overall performance!",
        );
    }

    Middleware::sync(move |req, res| {
        let started = Instant::now();
        let date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let ip = req.ip().map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string());
        let method = req.method_str().to_ascii_uppercase();
        let url = req.url().to_string();
        let logger = logger.clone();

        res.on_finish(move |status| {
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            logger.info(format_args!("{} {} {} {} {} {:.2} ms", date, ip, method, url, status, elapsed));
        });
        Ok(Flow::Next)
    })
}
