//! End-to-end dispatch through the kernel and the server entry point

use pitlane_core::request::METHOD_OVERRIDE;
use pitlane_core::{
    Config, Context, Controller, DbHandler, DbValue, Error, Kernel, Request, Response, Result,
    Server,
};
use std::fs;
use std::sync::Arc;

#[derive(Default)]
struct RacerController;

impl Controller for RacerController {
    fn call(&self, action: &str, ctx: &Context, request: &mut Request) -> Option<Result<Response>> {
        let result = match action {
            "show" => show(ctx, request),
            "destroy" => Ok(Response::text(format!(
                "deleted {}",
                request.param("id").unwrap_or_default()
            ))),
            _ => return None,
        };
        Some(result)
    }
}

fn show(ctx: &Context, request: &mut Request) -> Result<Response> {
    let id: i64 = request.param("id").and_then(|id| id.parse().ok()).unwrap_or_default();
    let row = ctx.block_on(async { ctx.db().await?.find("racers", "id", id).await })??;
    match row {
        Some(row) => Response::json_value(&row),
        None => Ok(Response::not_found()),
    }
}

#[derive(Default)]
struct HomeController;

impl Controller for HomeController {
    fn invoke(&self, _ctx: &Context, _request: &mut Request) -> Option<Result<Response>> {
        Some(Ok("Lights out".into()))
    }
}

fn context(config_dir: &std::path::Path) -> Context {
    fs::write(
        config_dir.join("routes.toml"),
        r#"
[[routes]]
method = "GET"
name = "home"
path = "/"
handler = ["HomeController"]

[[routes]]
method = "GET"
name = "racers.show"
path = "/racers/{id}/"
handler = "RacerController::show"

[[routes]]
method = "DELETE"
name = "racers.destroy"
path = "/racers/{id}"
handler = ["RacerController", "destroy"]
"#,
    )
    .unwrap();

    let mut ctx = Context::new(Config::new(config_dir));
    ctx.controllers_mut().register::<RacerController>("RacerController");
    ctx.controllers_mut().register::<HomeController>("HomeController");

    let routes = ctx.config().get("routes.routes").unwrap();
    ctx.router_mut().load_declarations(&routes).unwrap();
    ctx
}

#[test]
fn single_action_controller_from_declared_route() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Kernel::new(context(dir.path()));

    let response = kernel.handle(Request::forge("GET", "")).unwrap();
    assert_eq!(response.body, "Lights out");
}

#[test]
fn method_override_reaches_delete_route() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Kernel::new(context(dir.path()));

    let request = Request::forge("POST", "/racers/44")
        .with_input("POST", METHOD_OVERRIDE, "DELETE");
    let response = kernel.handle(request).unwrap();
    assert_eq!(response.body, "deleted 44");
}

#[test]
fn unmatched_request_gets_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = Kernel::new(context(dir.path()));

    let response = kernel.handle(Request::forge("GET", "/racers/4-4")).unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "404 - Page not found!");
}

#[test]
fn missing_action_is_ambiguous() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path());
    ctx.router_mut()
        .put("racers.update", "/racers/{id}", "RacerController::update".parse().unwrap(), &[])
        .unwrap();

    let result = Kernel::new(ctx).handle(Request::forge("PUT", "/racers/1"));
    assert!(matches!(result, Err(Error::AmbiguousAction { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn controller_reads_database_through_server() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());

    let db = DbHandler::connect_sqlite(":memory:", None).await.unwrap();
    db.raw("CREATE TABLE racers (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await
        .unwrap();
    db.create("racers", &[("id", 16.into()), ("name", DbValue::from("Charles"))])
        .await
        .unwrap();
    assert!(ctx.set_db(db));

    let server = Server::new(Arc::new(Kernel::new(ctx)));

    let response = server.test_request(Request::forge("GET", "/racers/16")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type, "application/json");
    assert!(response.body.contains("Charles"));

    let response = server.test_request(Request::forge("GET", "/racers/99")).await;
    assert_eq!(response.status, 404);
}
