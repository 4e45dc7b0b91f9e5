//! End-to-end dispatch through `TestClient`: routing, chains, error routing,
//! default handlers.

use std::cell::RefCell;
use std::rc::Rc;

use futures::FutureExt;
use rex_core::prelude::*;
use rex_core::testing::{MockConnection, TestClient};
use serde_json::{json, Value};

fn client(app: App) -> TestClient {
    TestClient::new(app).unwrap()
}

fn recorder(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> Middleware {
    let log = log.clone();
    Middleware::sync(move |_req, _res| {
        log.borrow_mut().push(name.to_string());
        Ok(Flow::Next)
    })
}

#[tokio::test]
async fn test_get_end_hello_world() {
    let mut app = App::default();
    app.get(
        "/end",
        Middleware::sync(|_req, res| {
            res.end("hello world");
            Ok(Flow::Next)
        }),
    );

    let res = client(app).get("/end").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.status_line.as_deref(), Some("200 OK"));
    assert_eq!(res.text(), "hello world");
}

#[tokio::test]
async fn test_post_json_echo() {
    let mut app = App::default();
    app.post(
        "/echo",
        Middleware::sync(|req, res| {
            res.json(&req.body())?;
            Ok(Flow::Next)
        }),
    );

    let client = client(app);
    let conn = MockConnection::new();
    let head = RequestHead::new("POST", "/echo").with_header("Content-Type", "application/json");
    let res = client.request_on(conn.clone(), head, Some(br#"{"hello":"world"}"#)).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(res.text(), r#"{"hello":"world"}"#);
    // body-bearing requests always complete through the corked path
    assert_eq!(conn.state().cork_calls, 1);
}

#[tokio::test]
async fn test_unmatched_route_is_404() {
    let res = client(App::default()).get("/missing").await;
    assert_eq!(res.status, 404);
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    assert!(res.text().contains("Cannot GET /missing"));
}

#[tokio::test]
async fn test_unmatched_route_json_404() {
    let app = App::default().with_prefer_json_errors(true);
    let res = client(app).request(RequestHead::new("delete", "/gone"), None).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.json().unwrap(), json!({ "status": 404, "err": "Cannot DELETE /gone" }));
}

#[tokio::test]
async fn test_chain_runs_in_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut app = App::default();
    app.use_middleware(recorder(&log, "global"));

    let tail = log.clone();
    app.get(
        "/chain",
        [
            recorder(&log, "A"),
            recorder(&log, "B"),
            Middleware::sync(move |_req, res| {
                tail.borrow_mut().push("C".to_string());
                res.end("done");
                Ok(Flow::Next)
            }),
        ],
    );

    let res = client(app).get("/chain").await;
    assert_eq!(res.text(), "done");
    assert_eq!(*log.borrow(), vec!["global", "A", "B", "C"]);
}

#[tokio::test]
async fn test_halt_stops_chain() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut app = App::default();
    app.get(
        "/halt",
        [
            Middleware::sync(|_req, res| {
                res.status(401).end("denied");
                Ok(Flow::Halt)
            }),
            recorder(&log, "never"),
        ],
    );

    let res = client(app).get("/halt").await;
    assert_eq!(res.status, 401);
    assert!(log.borrow().is_empty());
}

#[tokio::test]
async fn test_error_short_circuits_to_error_chain() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut app = App::default();
    app.get(
        "/fail",
        [
            recorder(&log, "A"),
            Middleware::sync(|_req, _res| Err(anyhow::anyhow!("nope"))),
            recorder(&log, "C"),
        ],
    );

    let seen = log.clone();
    app.use_error(ErrorMiddleware::sync(move |err, _req, res| {
        seen.borrow_mut().push(format!("error: {}", err));
        res.status(418).end(err.to_string());
        Ok(Flow::Halt)
    }));

    let res = client(app).get("/fail").await;
    assert_eq!(res.status, 418);
    assert_eq!(res.text(), "nope");
    assert_eq!(*log.borrow(), vec!["A", "error: nope"]);
}

#[tokio::test]
async fn test_default_error_handler() {
    let mut app = App::default();
    app.get("/fail", Middleware::sync(|_req, _res| Err(anyhow::anyhow!("database offline"))));

    let res = client(app).get("/fail").await;
    assert_eq!(res.status, 500);
    assert!(res.text().contains("database offline"));

    let mut app = App::default().with_prefer_json_errors(true);
    app.get("/fail", Middleware::sync(|_req, _res| Err(anyhow::anyhow!("database offline"))));

    let res = client(app).get("/fail").await;
    assert_eq!(res.status, 500);
    assert_eq!(res.json().unwrap(), json!({ "err": "database offline" }));
}

#[tokio::test]
async fn test_error_chain_forwarding() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut app = App::default().with_prefer_json_errors(true);
    app.get("/fail", Middleware::sync(|_req, _res| Err(anyhow::anyhow!("first"))));

    let log = seen.clone();
    app.use_error(ErrorMiddleware::sync(move |err, _req, _res| {
        log.borrow_mut().push(err.to_string());
        Err(anyhow::anyhow!("second"))
    }));
    let log = seen.clone();
    app.use_error(ErrorMiddleware::sync(move |err, _req, _res| {
        log.borrow_mut().push(err.to_string());
        Ok(Flow::Next)
    }));

    let res = client(app).get("/fail").await;
    assert_eq!(*seen.borrow(), vec!["first", "second"]);
    // Ok(Next) hands the same error to the default handler
    assert_eq!(res.json().unwrap(), json!({ "err": "second" }));
}

#[tokio::test]
async fn test_panics_reach_error_chain() {
    let mut app = App::default().with_prefer_json_errors(true);
    app.get("/panic", Middleware::sync(|_req, _res| panic!("boom")));

    let res = client(app).get("/panic").await;
    assert_eq!(res.status, 500);
    assert!(res.text().contains("boom"));
}

#[tokio::test]
async fn test_async_middleware_is_corked() {
    let mut app = App::default();
    app.get(
        "/slow",
        Middleware::future(|_req, res| {
            async move {
                tokio::task::yield_now().await;
                res.end("eventually");
                Ok(Flow::Next)
            }
            .boxed_local()
        }),
    );
    app.get(
        "/fast",
        Middleware::sync(|_req, res| {
            res.end("now");
            Ok(Flow::Next)
        }),
    );

    let client = client(app);
    let conn = MockConnection::new();
    let res = client.request_on(conn.clone(), RequestHead::new("GET", "/slow"), None).await;
    assert_eq!(res.text(), "eventually");
    assert_eq!(conn.state().cork_calls, 1);

    let conn = MockConnection::new();
    client.request_on(conn.clone(), RequestHead::new("GET", "/fast"), None).await;
    assert_eq!(conn.state().cork_calls, 0);
}

#[tokio::test]
async fn test_params_and_query() {
    let mut app = App::default();
    app.get(
        "/user/:id/posts/:post",
        Middleware::sync(|req, res| {
            let body = json!({
                "id": req.param("id"),
                "post": req.param("post"),
                "sort": req.query().get("sort"),
            });
            res.json(&body)?;
            Ok(Flow::Next)
        }),
    );

    let res = client(app).get("/user/42/posts/hello%20world?sort=new+first").await;
    assert_eq!(res.json().unwrap(), json!({ "id": "42", "post": "hello world", "sort": "new first" }));
}

#[tokio::test]
async fn test_literal_route_wins_over_placeholder() {
    let mut app = App::default();
    app.get(
        "/user/:id",
        Middleware::sync(|req, res| {
            res.end(format!("user {}", req.param("id").unwrap_or("?")));
            Ok(Flow::Next)
        }),
    );
    app.get(
        "/user/active",
        Middleware::sync(|_req, res| {
            res.end("active users");
            Ok(Flow::Next)
        }),
    );

    let client = client(app);
    assert_eq!(client.get("/user/active").await.text(), "active users");
    assert_eq!(client.get("/user/7").await.text(), "user 7");
}

#[tokio::test]
async fn test_reregistration_overrides() {
    let mut app = App::default();
    app.get(
        "/item/:id",
        Middleware::sync(|_req, res| {
            res.end("old");
            Ok(Flow::Next)
        }),
    );
    app.get(
        "/item/:name",
        Middleware::sync(|req, res| {
            res.end(format!("new {}", req.param("name").unwrap_or("?")));
            Ok(Flow::Next)
        }),
    );

    let res = client(app).get("/item/x").await;
    assert_eq!(res.text(), "new x");
}

#[tokio::test]
async fn test_mounted_router_original_url() {
    let mut api = Router::new();
    api.get(
        "/info/:id",
        Middleware::sync(|req, res| {
            let body = json!({
                "url": req.url(),
                "original_url": req.original_url(),
                "base_url": req.base_url(),
            });
            res.json(&body)?;
            Ok(Flow::Next)
        }),
    );
    api.route("/items").get(Middleware::sync(|_req, res| {
        res.end("list");
        Ok(Flow::Next)
    }));

    let mut app = App::default();
    app.use_router("/api", api);
    let client = client(app);

    let res = client.get("/api/info/3").await;
    assert_eq!(
        res.json().unwrap(),
        json!({ "url": "/api/info/3", "original_url": "/info/3", "base_url": "/api" })
    );
    assert_eq!(client.get("/api/items").await.text(), "list");
    assert_eq!(client.get("/info/3").await.status, 404);
}

#[tokio::test]
async fn test_catch_all_replaces_not_found() {
    let mut app = App::default();
    app.get(
        "/known",
        Middleware::sync(|_req, res| {
            res.end("known");
            Ok(Flow::Next)
        }),
    );
    app.any(
        "/*",
        Middleware::sync(|req, res| {
            res.status(200).end(format!("fallback {} {}", req.method(), req.url()));
            Ok(Flow::Next)
        }),
    );

    let client = client(app);
    assert_eq!(client.get("/known").await.text(), "known");

    let res = client.request(RequestHead::new("PUT", "/deep/path"), None).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "fallback PUT /deep/path");
}

#[tokio::test]
async fn test_custom_not_found_after_globals() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut app = App::default();
    app.use_middleware(recorder(&log, "global"));
    app.not_found(Middleware::sync(|req, res| {
        res.status(404).send(format!("no page at {}", req.url()));
        Ok(Flow::Halt)
    }));

    let res = client(app).get("/nowhere").await;
    assert_eq!(res.status, 404);
    assert_eq!(res.text(), "no page at /nowhere");
    assert_eq!(*log.borrow(), vec!["global"]);
}

#[tokio::test]
async fn test_form_and_text_bodies() {
    let mut app = App::default();
    app.post(
        "/form",
        Middleware::sync(|req, res| {
            let form = req.body().and_then(Body::as_form).cloned().unwrap_or_default();
            res.json(&form)?;
            Ok(Flow::Next)
        }),
    );
    app.put(
        "/note",
        Middleware::sync(|req, res| {
            let text = req.body().and_then(Body::as_text).unwrap_or_default().to_uppercase();
            res.end(text);
            Ok(Flow::Next)
        }),
    );

    let client = client(app);
    let res = client
        .post("/form", "application/x-www-form-urlencoded", b"name=Rex&tags=a%2Cb")
        .await;
    assert_eq!(res.json().unwrap(), json!({ "name": "Rex", "tags": "a,b" }));

    let head = RequestHead::new("PUT", "/note").with_header("content-type", "text/plain");
    let res = client.request(head, Some(b"quiet")).await;
    assert_eq!(res.text(), "QUIET");
}

#[tokio::test]
async fn test_malformed_json_goes_to_error_chain() {
    let mut app = App::default().with_prefer_json_errors(true);
    app.post(
        "/echo",
        Middleware::sync(|_req, res| {
            res.end("unreachable");
            Ok(Flow::Next)
        }),
    );

    let res = client(app).post("/echo", "application/json", b"{not json").await;
    assert_eq!(res.status, 500);
    assert!(res.json().unwrap()["err"].is_string());
}

#[tokio::test]
async fn test_body_parsing_disabled() {
    let mut app = App::default().with_body_parsing(BodyParsing::Enabled(false));
    app.post(
        "/raw",
        Middleware::sync(|req, res| {
            let parsed = req.body().is_some();
            let raw = req.raw().map(|raw| raw.len()).unwrap_or_default();
            res.json(&json!({ "parsed": parsed, "raw": raw }))?;
            Ok(Flow::Next)
        }),
    );

    let res = client(app).post("/raw", "application/json", b"{}").await;
    assert_eq!(res.json().unwrap(), json!({ "parsed": false, "raw": 2 }));
}

#[tokio::test]
async fn test_cookies_round_trip() {
    let mut app = App::default();
    app.get(
        "/session",
        Middleware::sync(|req, res| {
            let seen = req.cookies().and_then(|cookies| cookies.get("visits").cloned());
            res.cookie("session", "abc", &CookieOptions::default())?;
            res.cookie("prefs", json!({ "theme": "dark" }), &CookieOptions::default())?;
            res.clear_cookie("legacy", &CookieOptions::default())?;
            res.end(seen.unwrap_or_default());
            Ok(Flow::Next)
        }),
    );

    let head = RequestHead::new("GET", "/session").with_header("cookie", "visits=3; other=x");
    let res = client(app).request(head, None).await;

    assert_eq!(res.text(), "3");
    let cookies = res.header_all("set-cookie");
    assert_eq!(cookies.len(), 3);
    assert!(cookies[0].starts_with("session=abc"));
    assert!(cookies[0].contains("Path=/"));
    assert!(cookies[1].starts_with("prefs=j%3A"));
    assert!(cookies[2].starts_with("legacy="));
    assert!(cookies[2].contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
}

#[tokio::test]
async fn test_redirect_back_uses_referrer() {
    let mut app = App::default();
    app.get(
        "/back",
        Middleware::sync(|_req, res| {
            res.redirect("back");
            Ok(Flow::Next)
        }),
    );

    let client = client(app);
    let head = RequestHead::new("GET", "/back").with_header("referer", "/from here");
    let res = client.request(head, None).await;
    assert_eq!(res.status, 302);
    assert_eq!(res.header("location"), Some("/from%20here"));

    let res = client.get("/back").await;
    assert_eq!(res.header("location"), Some("/"));
}

#[tokio::test]
async fn test_render_merges_locals() {
    let mut app = App::default();
    app.set_view(|view: &str, data: &Value| -> Result<String, HandlerError> {
        Ok(format!("{}:{}:{}", view, data["title"], data["user"]))
    });
    app.use_middleware(Middleware::sync(|_req, res| {
        res.locals.insert("user".to_string(), json!("ada"));
        Ok(Flow::Next)
    }));
    app.get(
        "/page",
        Middleware::sync(|_req, res| {
            res.render("index", &json!({ "title": "Home" }));
            Ok(Flow::Next)
        }),
    );

    let res = client(app).get("/page").await;
    assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(res.text(), r#"index:"Home":"ada""#);
}

#[tokio::test]
async fn test_render_without_renderer() {
    let mut app = App::default();
    app.get(
        "/page",
        Middleware::sync(|_req, res| {
            res.render("index", &json!({}));
            Ok(Flow::Next)
        }),
    );

    let res = client(app).get("/page").await;
    assert_eq!(res.status, 500);
    assert_eq!(res.text(), "Missing view render method");
}

#[tokio::test]
async fn test_native_handlers_come_first() {
    let mut app = App::default();
    app.get(
        "/health",
        Middleware::sync(|_req, res| {
            res.end("chain");
            Ok(Flow::Next)
        }),
    );
    app.use_native_handlers(|native| {
        native.get("/health", |_head, conn| {
            conn.write_status("200 OK");
            conn.end(bytes::Bytes::from_static(b"native"));
        });
    });

    let res = client(app).get("/health").await;
    assert_eq!(res.text(), "native");
}

#[tokio::test]
async fn test_http_logger_does_not_touch_response() {
    let mut app = App::default();
    app.use_middleware(http_logger(Logger::silent()));
    app.get(
        "/logged",
        Middleware::sync(|_req, res| {
            res.status(201).end("created");
            Ok(Flow::Next)
        }),
    );

    let res = client(app).get("/logged").await;
    assert_eq!(res.status, 201);
    assert_eq!(res.text(), "created");
}

#[tokio::test]
async fn test_second_end_is_ignored() {
    let mut app = App::default();
    app.get(
        "/twice",
        [
            Middleware::sync(|_req, res| {
                res.end("first");
                Ok(Flow::Next)
            }),
            Middleware::sync(|_req, res| {
                res.end("second");
                Ok(Flow::Next)
            }),
        ],
    );

    let client = client(app);
    let conn = MockConnection::new();
    let res = client.request_on(conn.clone(), RequestHead::new("GET", "/twice"), None).await;
    assert_eq!(res.text(), "first");
    assert_eq!(conn.state().end_calls, 1);
}
