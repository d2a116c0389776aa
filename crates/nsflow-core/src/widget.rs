//! Form widgets requested from the widget agent.
//!
//! The agent answers with a `WidgetSpec` whose `schema` describes a form.
//! `WidgetForm` keeps the field values seeded from the schema defaults and
//! validates every edit against it.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{json, Map, Value};

use nsflow_types::{session::SessionId, turn::Turn, widget::WidgetSpec};
use crate::channel::ChannelManager;
use crate::correlated::{CorrelatedRequestClient, RequestOutcome};
use crate::ports::TimerPort;
use crate::schema::{get_default_values, SchemaValidator, ValidationReport};

/// Turns of context forwarded with a widget request
pub const WIDGET_CONTEXT_TURNS: usize = 10;

pub struct WidgetClient {
    agent: String,
    session: Option<SessionId>,
    channels: Rc<ChannelManager>,
    timer: Rc<dyn TimerPort>,
    client: CorrelatedRequestClient,
    validator: SchemaValidator,
    open_timeout_ms: u64,
    request_timeout_ms: u64,
}

impl WidgetClient {
    pub fn new(
        agent: impl Into<String>,
        session: Option<SessionId>,
        channels: Rc<ChannelManager>,
        timer: Rc<dyn TimerPort>,
        validator: SchemaValidator,
    ) -> Self {
        Self {
            agent: agent.into(),
            session,
            channels,
            client: CorrelatedRequestClient::new(timer.clone()),
            timer,
            validator,
            open_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }

    pub fn with_timeouts(mut self, open_timeout_ms: u64, request_timeout_ms: u64) -> Self {
        self.open_timeout_ms = open_timeout_ms;
        self.request_timeout_ms = request_timeout_ms;
        self
    }

    /// Ask the widget agent for a form fitting the conversation so far.
    /// `None` when the agent is unreachable or replies with an unusable spec.
    pub async fn request_widget(&self, conversation: &[Turn]) -> Option<WidgetForm> {
        let channel = self.channels.open(&self.agent, self.session.as_ref())?;
        if !channel.wait_open(self.timer.as_ref(), self.open_timeout_ms).await {
            log::warn!("Widget agent {} did not answer the handshake", self.agent);
            return None;
        }

        let payload = widget_payload(conversation);
        let outcome = self
            .client
            .request(Some(&channel), &payload, self.request_timeout_ms)
            .await;
        channel.close();

        let reply = match outcome {
            RequestOutcome::Reply(value) => value,
            RequestOutcome::Fallback(_) => return None,
        };

        let spec: WidgetSpec = match serde_json::from_value(reply) {
            Ok(spec) => spec,
            Err(e) => {
                log::warn!("Widget reply is not a widget spec: {}", e);
                return None;
            }
        };
        if let Err(e) = self.validator.check_schema(&spec.schema) {
            log::warn!("Widget '{}' carries an invalid schema: {}", spec.title, e);
            return None;
        }

        log::info!("Widget '{}' received", spec.title);
        Some(WidgetForm::new(spec, self.validator.clone()))
    }
}

/// Request body for the widget agent.
pub fn widget_payload(conversation: &[Turn]) -> Value {
    let skip = conversation.len().saturating_sub(WIDGET_CONTEXT_TURNS);
    let context: Vec<Value> = conversation
        .iter()
        .skip(skip)
        .map(|turn| json!({ "sender": turn.sender, "text": turn.text }))
        .collect();
    json!({ "request_type": "widget", "conversation": context })
}

/// Editable form state backed by a widget schema
pub struct WidgetForm {
    spec: WidgetSpec,
    values: Map<String, Value>,
    field_errors: BTreeMap<String, String>,
    validator: SchemaValidator,
}

impl WidgetForm {
    pub fn new(spec: WidgetSpec, validator: SchemaValidator) -> Self {
        let values = get_default_values(&spec.schema);
        Self {
            spec,
            values,
            field_errors: BTreeMap::new(),
            validator,
        }
    }

    pub fn spec(&self) -> &WidgetSpec {
        &self.spec
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Current error per field, from the latest edit of that field
    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    /// Store `value` for `field` and validate it. The value is kept even when
    /// invalid, so the user can keep editing.
    pub fn set_field(&mut self, field: &str, value: Value) -> ValidationReport {
        let report = self
            .validator
            .validate_field(&self.spec.schema, field, Some(&value));
        self.values.insert(field.to_string(), value);

        match &report.error_message {
            Some(message) if !report.valid => {
                self.field_errors.insert(field.to_string(), message.clone());
            }
            _ => {
                self.field_errors.remove(field);
            }
        }
        report
    }

    /// Validate the whole form. On success returns the submitted values.
    pub fn submit(&mut self) -> Result<Value, ValidationReport> {
        let data = Value::Object(self.values.clone());
        let report = self.validator.validate(&self.spec.schema, &data);
        if report.valid {
            self.field_errors.clear();
            return Ok(data);
        }

        for violation in &report.errors {
            self.field_errors
                .insert(violation.field.clone(), violation.message.clone());
        }
        log::debug!("Widget '{}' rejected: {:?}", self.spec.title, report.error_message);
        Err(report)
    }
}
