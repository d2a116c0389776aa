//! Cache-backed artifact generation.
//!
//! An artifact is looked up in the durable store first and only generated by
//! the remote agent when the requested slot is empty. Generated artifacts are
//! written back so the next lookup is served from the store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{json, Map, Value};

use nsflow_types::{
    artifact::{ArtifactKey, ArtifactSource, ArtifactState, GeneratedArtifact, Variant},
    event::ClientEvent,
    network::NetworkGraph,
    session::SessionId,
};
use crate::channel::ChannelManager;
use crate::correlated::{CorrelatedRequestClient, RequestOutcome};
use crate::event_bus::EventBus;
use crate::ports::{ArtifactStorePort, ConnectivityPort, TimerPort};
use crate::schema::SchemaValidator;

/// Node fields the generating agent gets to see
const NODE_FIELDS: &[&str] = &["parent", "children", "instructions"];
const METADATA_FIELDS: &[&str] = &["description", "tags"];

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Agent that produces artifacts
    pub agent: String,
    pub session: Option<SessionId>,
    pub open_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Schema every generated artifact must satisfy, if any
    pub artifact_schema: Option<Value>,
}

impl WorkflowSettings {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            session: None,
            open_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            artifact_schema: None,
        }
    }
}

/// Remote collaborators of the workflow
pub struct WorkflowPorts {
    pub store: Rc<dyn ArtifactStorePort>,
    pub connectivity: Rc<dyn ConnectivityPort>,
    pub channels: Rc<ChannelManager>,
    pub timer: Rc<dyn TimerPort>,
}

pub struct ArtifactWorkflow {
    settings: WorkflowSettings,
    ports: WorkflowPorts,
    client: CorrelatedRequestClient,
    validator: SchemaValidator,
    events: EventBus,
    states: RefCell<HashMap<ArtifactKey, ArtifactState>>,
}

impl ArtifactWorkflow {
    pub fn new(settings: WorkflowSettings, ports: WorkflowPorts, validator: SchemaValidator, events: EventBus) -> Self {
        let client = CorrelatedRequestClient::new(ports.timer.clone());
        Self {
            settings,
            ports,
            client,
            validator,
            events,
            states: RefCell::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn state(&self, subject: &str, variant: Variant) -> ArtifactState {
        self.states
            .borrow()
            .get(&ArtifactKey::new(subject, variant))
            .copied()
            .unwrap_or(ArtifactState::Uncached)
    }

    /// Return the stored artifact, generating and saving it when absent.
    pub async fn get_or_generate(&self, subject: &str, variant: Variant) -> Option<GeneratedArtifact> {
        match self.ports.store.fetch_artifact(subject).await {
            Ok(Some(record)) => {
                if let Some(value) = record.slot(variant) {
                    log::debug!("Artifact {}/{} served from store", subject, variant);
                    self.set_state(subject, variant, ArtifactState::Cached);
                    let source = ArtifactSource::Cache;
                    self.events.emit(ClientEvent::ArtifactReady {
                        subject: subject.to_string(),
                        variant,
                        source,
                    });
                    return Some(GeneratedArtifact {
                        subject: subject.to_string(),
                        variant,
                        value: value.clone(),
                        source,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Artifact store lookup for {} failed, generating: {}", subject, e);
            }
        }

        self.generate(subject, variant, None, ArtifactState::Generating).await
    }

    /// Regenerate unconditionally, overwriting the stored slot.
    /// `hint` is passed to the agent as `user_prompt`.
    pub async fn refresh(&self, subject: &str, variant: Variant, hint: Option<&str>) -> Option<GeneratedArtifact> {
        self.generate(subject, variant, hint, ArtifactState::Refreshing).await
    }

    async fn generate(
        &self,
        subject: &str,
        variant: Variant,
        hint: Option<&str>,
        working: ArtifactState,
    ) -> Option<GeneratedArtifact> {
        let previous = self.state(subject, variant);
        self.set_state(subject, variant, working);

        match self.produce(subject, variant, hint).await {
            Ok((value, persisted)) => {
                self.set_state(subject, variant, ArtifactState::Cached);
                let source = ArtifactSource::Generated { persisted };
                log::info!("Artifact {}/{} generated", subject, variant);
                self.events.emit(ClientEvent::ArtifactReady {
                    subject: subject.to_string(),
                    variant,
                    source,
                });
                Some(GeneratedArtifact {
                    subject: subject.to_string(),
                    variant,
                    value,
                    source,
                })
            }
            Err(reason) => {
                log::warn!("Artifact {}/{} unavailable: {}", subject, variant, reason);
                let restored = if previous == ArtifactState::Cached {
                    ArtifactState::Cached
                } else {
                    ArtifactState::Failed
                };
                self.set_state(subject, variant, restored);
                self.events.emit(ClientEvent::ArtifactFailed {
                    subject: subject.to_string(),
                    variant,
                    reason,
                });
                None
            }
        }
    }

    /// Returns the artifact and whether the store accepted it.
    async fn produce(&self, subject: &str, variant: Variant, hint: Option<&str>) -> Result<(Value, bool), String> {
        let graph = self
            .ports
            .connectivity
            .fetch_network(subject)
            .await
            .map_err(|e| format!("connectivity unavailable: {}", e))?;
        let payload = generation_payload(subject, variant, &graph, hint);

        let agent = &self.settings.agent;
        let channel = self
            .ports
            .channels
            .open(agent, self.settings.session.as_ref())
            .ok_or_else(|| format!("cannot reach {}", agent))?;
        if !channel.wait_open(self.ports.timer.as_ref(), self.settings.open_timeout_ms).await {
            return Err(format!("channel to {} did not open", agent));
        }

        let outcome = self
            .client
            .request(Some(&channel), &payload, self.settings.request_timeout_ms)
            .await;
        channel.close();

        let artifact = match outcome {
            RequestOutcome::Reply(value) => value,
            RequestOutcome::Fallback(reason) => return Err(reason.to_string()),
        };
        self.check_artifact(&artifact)?;

        let persisted = match self.ports.store.save_artifact(subject, variant, &artifact).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Artifact {}/{} generated but not saved: {}", subject, variant, e);
                false
            }
        };
        Ok((artifact, persisted))
    }

    fn check_artifact(&self, artifact: &Value) -> Result<(), String> {
        if !artifact.is_object() {
            return Err("reply is not an object".to_string());
        }
        if artifact.get("type").and_then(Value::as_str).is_none() {
            return Err("reply has no string `type`".to_string());
        }
        if let Some(schema) = &self.settings.artifact_schema {
            let report = self.validator.validate(schema, artifact);
            if !report.valid {
                return Err(report
                    .error_message
                    .unwrap_or_else(|| "reply does not match the artifact schema".to_string()));
            }
        }
        Ok(())
    }

    fn set_state(&self, subject: &str, variant: Variant, state: ArtifactState) {
        self.states
            .borrow_mut()
            .insert(ArtifactKey::new(subject, variant), state);
    }
}

/// The request body sent to the generating agent.
pub fn generation_payload(subject: &str, variant: Variant, graph: &NetworkGraph, hint: Option<&str>) -> Value {
    let mut payload = json!({
        "network_name": subject,
        "theme_type": variant.as_str(),
        "connectivity": reduce_network(graph),
    });
    if let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) {
        payload["user_prompt"] = Value::String(hint.to_string());
    }
    payload
}

/// Strip a network graph down to structure and descriptive text.
pub fn reduce_network(graph: &NetworkGraph) -> Value {
    let nodes: Vec<Value> = graph
        .nodes
        .iter()
        .map(|node| {
            let mut reduced = Map::new();
            reduced.insert("id".into(), Value::String(node.id.clone()));
            reduced.insert("label".into(), Value::String(node.label().to_string()));
            for field in NODE_FIELDS {
                if let Some(v) = node.data.get(*field).filter(|v| !v.is_null()) {
                    reduced.insert((*field).into(), v.clone());
                }
            }
            Value::Object(reduced)
        })
        .collect();

    let edges: Vec<Value> = graph
        .edges
        .iter()
        .map(|edge| json!({ "source": edge.source, "target": edge.target }))
        .collect();

    let metadata: Map<String, Value> = METADATA_FIELDS
        .iter()
        .filter_map(|field| {
            graph
                .metadata
                .get(*field)
                .filter(|v| !v.is_null())
                .map(|v| ((*field).to_string(), v.clone()))
        })
        .collect();

    json!({ "nodes": nodes, "edges": edges, "metadata": metadata })
}
