//! Line-oriented command console over the engine's logical operations.
//!
//! One command per line, one JSON reply per line:
//!
//! ```text
//! create {"name":"n","method":"POST","bodySchema":{},"validationSource":"fn validate(d) { .. }"}
//! get <name>
//! list
//! delete <name>
//! invoke <name> {"email":"user@example.com"}
//! health
//! meta
//! ```

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::pipeline::ValidationPipeline;
use crate::registry::CreateConfig;

/// Reply to one console command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, json!({ "error": "Bad request", "message": message.into() }))
    }

    fn serialized<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self::new(status, body),
            Err(e) => Self::new(
                500,
                json!({ "error": "Serialization failed", "message": e.to_string() }),
            ),
        }
    }
}

/// Dispatches console commands to the registry and pipeline
pub struct Console<'a> {
    pipeline: &'a ValidationPipeline,
    expose_internal_errors: bool,
}

impl<'a> Console<'a> {
    pub fn new(pipeline: &'a ValidationPipeline, expose_internal_errors: bool) -> Self {
        Self {
            pipeline,
            expose_internal_errors,
        }
    }

    /// Handle one input line
    pub async fn handle_line(&self, line: &str) -> Option<Reply> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        debug!(command, "Console command");

        let reply = match command {
            "create" => self.create(rest),
            "get" => self.get(rest),
            "list" => self.list(),
            "delete" => self.delete(rest),
            "invoke" => self.invoke(rest).await,
            "health" => Self::health(),
            "meta" => Self::meta(),
            other => Reply::bad_request(format!("Unknown command '{}'", other)),
        };
        Some(reply)
    }

    fn create(&self, rest: &str) -> Reply {
        let request: CreateConfig = match serde_json::from_str(rest) {
            Ok(request) => request,
            Err(e) => return Reply::bad_request(format!("Invalid configuration data: {}", e)),
        };

        match self.pipeline.registry().create(request) {
            Ok(config) => Reply::serialized(201, &*config),
            Err(e) => Reply::new(e.status_code(), json!({ "message": e.to_string() })),
        }
    }

    fn get(&self, name: &str) -> Reply {
        match self.pipeline.registry().find_by_name(name) {
            Ok(config) => Reply::serialized(200, &*config),
            Err(e) => Reply::new(e.status_code(), json!({ "message": e.to_string() })),
        }
    }

    fn list(&self) -> Reply {
        let configs = self.pipeline.registry().list();
        let configs: Vec<_> = configs.iter().map(|c| &**c).collect();
        Reply::serialized(200, &configs)
    }

    fn delete(&self, name: &str) -> Reply {
        let deleted = self.pipeline.registry().delete(name);
        Reply::new(200, json!({ "deleted": deleted }))
    }

    fn health() -> Reply {
        Reply::new(
            200,
            json!({
                "status": "ok",
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        )
    }

    fn meta() -> Reply {
        Reply::new(
            200,
            json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "description": env!("CARGO_PKG_DESCRIPTION"),
            }),
        )
    }

    async fn invoke(&self, rest: &str) -> Reply {
        let (name, payload) = rest.split_once(char::is_whitespace).unwrap_or((rest, "{}"));
        if name.is_empty() {
            return Reply::bad_request("invoke requires a configuration name");
        }

        let payload: Value = match serde_json::from_str(payload.trim()) {
            Ok(payload) => payload,
            Err(e) => return Reply::bad_request(format!("Invalid JSON body: {}", e)),
        };

        match self.pipeline.invoke(name, &payload).await {
            Ok(envelope) => Reply::serialized(200, &envelope),
            Err(e) => Reply::new(e.status_code(), e.to_body(self.expose_internal_errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConfigRegistry;
    use crate::sandbox::ScriptSandbox;
    use std::sync::Arc;

    fn pipeline() -> ValidationPipeline {
        ValidationPipeline::new(
            Arc::new(ConfigRegistry::new()),
            Arc::new(ScriptSandbox::default()),
        )
    }

    const CREATE_EMAIL: &str = r#"create {"name":"email-validator","method":"POST","bodySchema":{"email":"string","username":"string"},"validationSource":"fn validate(data) { if data.body.email == \"\" { return #{ isValid: false, message: \"Email is required.\" }; } #{ isValid: true, message: \"Email is valid.\", processedEmail: data.body.email.to_lower() } }"}"#;

    #[tokio::test]
    async fn test_full_lifecycle() {
        let pipeline = pipeline();
        let console = Console::new(&pipeline, false);

        let reply = console.handle_line(CREATE_EMAIL).await.unwrap();
        assert_eq!(reply.status, 201);
        assert_eq!(reply.body["name"], "email-validator");

        let reply = console.handle_line(CREATE_EMAIL).await.unwrap();
        assert_eq!(reply.status, 409);

        let reply = console
            .handle_line(r#"invoke email-validator {"email":"User@Example.com","username":"test"}"#)
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["processedMessage"], "Email is valid.");
        assert_eq!(reply.body["processedEmail"], "user@example.com");

        let reply = console
            .handle_line(r#"invoke email-validator {"email":"","username":"test"}"#)
            .await
            .unwrap();
        assert_eq!(reply.status, 400);
        assert_eq!(reply.body, json!({ "isValid": false, "message": "Email is required." }));

        let reply = console.handle_line("list").await.unwrap();
        assert_eq!(reply.body.as_array().unwrap().len(), 1);

        let reply = console.handle_line("delete email-validator").await.unwrap();
        assert_eq!(reply.body, json!({ "deleted": true }));
        let reply = console.handle_line("delete email-validator").await.unwrap();
        assert_eq!(reply.body, json!({ "deleted": false }));

        let reply = console.handle_line("get email-validator").await.unwrap();
        assert_eq!(reply.status, 404);
    }

    #[tokio::test]
    async fn test_health_and_meta() {
        let pipeline = pipeline();
        let console = Console::new(&pipeline, false);

        let reply = console.handle_line("health").await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["status"], "ok");
        let timestamp = reply.body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());

        let reply = console.handle_line("meta").await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["name"], "dynapi-engine");
        assert_eq!(reply.body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_bad_input() {
        let pipeline = pipeline();
        let console = Console::new(&pipeline, false);

        assert!(console.handle_line("   ").await.is_none());
        assert!(console.handle_line("# comment").await.is_none());
        assert_eq!(console.handle_line("frobnicate").await.unwrap().status, 400);
        assert_eq!(console.handle_line("create {nope").await.unwrap().status, 400);
        assert_eq!(console.handle_line("invoke x {nope").await.unwrap().status, 400);
        assert_eq!(console.handle_line("invoke missing {}").await.unwrap().status, 404);

        let bad_source = r#"create {"name":"x","method":"POST","bodySchema":{},"validationSource":"function customValidation(d) {}"}"#;
        assert_eq!(console.handle_line(bad_source).await.unwrap().status, 400);
    }
}
