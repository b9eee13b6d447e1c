//! Application controllers

use pitlane_core::{Context, Controller, DbValue, Request, Response, Result};
use serde_json::json;

/// Landing page
#[derive(Default)]
pub struct HomeController;

impl Controller for HomeController {
    fn invoke(&self, _ctx: &Context, request: &mut Request) -> Option<Result<Response>> {
        let body = json!({
            "name": "pitlane",
            "version": pitlane_core::VERSION,
            "url": request.current_url(),
        });
        Some(Ok(body.into()))
    }
}

/// Racer records backed by the `racers` table
#[derive(Default)]
pub struct RacerController;

impl RacerController {
    fn index(ctx: &Context) -> Result<Response> {
        let rows = ctx.block_on(async { ctx.db().await?.raw("SELECT * FROM racers", &[]).await })??;
        Response::json_value(&rows.unwrap_or_default())
    }

    fn show(ctx: &Context, request: &Request) -> Result<Response> {
        let Some(id) = request.param("id").and_then(|id| id.parse::<i64>().ok()) else {
            return Ok(Response::not_found());
        };

        let row = ctx.block_on(async { ctx.db().await?.find("racers", "id", id).await })??;
        row.map_or_else(|| Ok(Response::not_found()), |row| Response::json_value(&row))
    }

    fn store(ctx: &Context, request: &Request) -> Result<Response> {
        let fields: Vec<(&str, DbValue)> = ["id", "name", "team"]
            .into_iter()
            .filter_map(|column| request.input(column).map(|value| (column, to_db_value(value))))
            .collect();

        let created = ctx.block_on(async { ctx.db().await?.create("racers", &fields).await })??;
        Ok(if created {
            Response::json(r#"{"created":true}"#).with_status(201)
        } else {
            Response::json(r#"{"created":false}"#).with_status(422)
        })
    }
}

impl Controller for RacerController {
    fn call(&self, action: &str, ctx: &Context, request: &mut Request) -> Option<Result<Response>> {
        match action {
            "index" => Some(Self::index(ctx)),
            "show" => Some(Self::show(ctx, request)),
            "store" => Some(Self::store(ctx, request)),
            _ => None,
        }
    }
}

fn to_db_value(value: &serde_json::Value) -> DbValue {
    match value {
        serde_json::Value::Null => DbValue::Null,
        serde_json::Value::Bool(b) => DbValue::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| n.as_f64().map_or(DbValue::Null, DbValue::Float), DbValue::Int),
        serde_json::Value::String(s) => DbValue::String(s.clone()),
        other => DbValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_db_value() {
        assert_eq!(to_db_value(&json!(44)), DbValue::Int(44));
        assert_eq!(to_db_value(&json!(1.5)), DbValue::Float(1.5));
        assert_eq!(to_db_value(&json!("Lewis")), DbValue::String("Lewis".to_string()));
        assert_eq!(to_db_value(&json!(null)), DbValue::Null);
    }

    #[test]
    fn test_show_without_bound_id_is_not_found() {
        let ctx = Context::new(pitlane_core::Config::new("config"));
        let response = RacerController::show(&ctx, &Request::forge("GET", "/racers/abc")).unwrap();
        assert_eq!(response.status, 404);
    }
}
