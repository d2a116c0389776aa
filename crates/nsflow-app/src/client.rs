//! The `NsflowClient` facade handed to the dashboard's view layer.
//!
//! All state lives in one `Dashboard` behind an `Rc`; async methods clone the
//! handle into the promise they return. Values cross the JS boundary as plain
//! JSON objects.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use gloo_utils::format::JsValueSerdeExt;
use js_sys::Promise;
use serde::Serialize;
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use nsflow_core::channel::ChannelManager;
use nsflow_core::conversation::{ConversationStream, Delivery};
use nsflow_core::event_bus::EventBus;
use nsflow_core::generation::{ArtifactWorkflow, WorkflowPorts, WorkflowSettings};
use nsflow_core::log_stream::LogStream;
use nsflow_core::ports::{
    ArtifactStorePort, ChannelConnector, ConnectivityPort, StoragePort, ThreadStorePort, TimerPort,
};
use nsflow_core::preferences::PreferenceStore;
use nsflow_core::schema::{SchemaValidator, ValidationReport};
use nsflow_core::threads::{ThreadArchive, MESSAGE_PAGE_SIZE};
use nsflow_core::widget::{WidgetClient, WidgetForm, WIDGET_CONTEXT_TURNS};
use nsflow_platform::http::{HttpArtifactStore, HttpConnectivitySource, HttpThreadStore};
use nsflow_platform::storage::auto_detect_storage;
use nsflow_platform::timer::BrowserTimer;
use nsflow_platform::websocket::WebSocketConnector;
use nsflow_types::{
    ClientError, Result,
    artifact::Variant,
    config::{ClientConfig, ThemePreferences},
    session::SessionId,
    turn::Turn,
    widget::WidgetSpec,
};

struct Dashboard {
    config: ClientConfig,
    session: SessionId,
    events: EventBus,
    validator: SchemaValidator,
    preferences: PreferenceStore,
    conversation: RefCell<ConversationStream>,
    themes: ArtifactWorkflow,
    widgets: WidgetClient,
    form: RefCell<Option<WidgetForm>>,
    threads: ThreadArchive,
    logs: RefCell<LogStream>,
}

impl Dashboard {
    fn assemble(config: ClientConfig, session: SessionId, storage: Rc<dyn StoragePort>) -> Self {
        let events = EventBus::new();
        let validator = SchemaValidator::new();

        let connector: Rc<dyn ChannelConnector> = Rc::new(WebSocketConnector);
        let timer: Rc<dyn TimerPort> = Rc::new(BrowserTimer);
        let channels = Rc::new(ChannelManager::new(
            config.ws_base_url.clone(),
            connector,
            events.clone(),
        ));

        let store: Rc<dyn ArtifactStorePort> = Rc::new(HttpArtifactStore::new(config.api_base_url.clone()));
        let connectivity: Rc<dyn ConnectivityPort> =
            Rc::new(HttpConnectivitySource::new(config.api_base_url.clone()));
        let settings = WorkflowSettings {
            agent: config.theme_agent.clone(),
            session: Some(session.clone()),
            open_timeout_ms: config.open_timeout_ms,
            request_timeout_ms: config.request_timeout_ms,
            artifact_schema: None,
        };
        let themes = ArtifactWorkflow::new(
            settings,
            WorkflowPorts {
                store,
                connectivity,
                channels: channels.clone(),
                timer: timer.clone(),
            },
            validator.clone(),
            events.clone(),
        );

        let widgets = WidgetClient::new(
            config.widget_agent.clone(),
            Some(session.clone()),
            channels.clone(),
            timer,
            validator.clone(),
        )
        .with_timeouts(config.open_timeout_ms, config.request_timeout_ms);

        let conversation = ConversationStream::new(channels.clone(), events.clone(), Some(session.clone()));
        let logs = LogStream::new(channels, config.log_buffer_size);
        let thread_store: Rc<dyn ThreadStorePort> = Rc::new(HttpThreadStore::new(config.api_base_url.clone()));

        Self {
            config,
            session,
            events,
            validator,
            preferences: PreferenceStore::new(storage),
            conversation: RefCell::new(conversation),
            themes,
            widgets,
            form: RefCell::new(None),
            threads: ThreadArchive::new(thread_store),
            logs: RefCell::new(logs),
        }
    }

    /// Store the turns appended since transcript index `from` into the
    /// active thread, in the background.
    fn archive_since(self: &Rc<Self>, from: usize) {
        if self.threads.active().is_none() {
            return;
        }
        let turns: Vec<Turn> = self
            .conversation
            .borrow()
            .transcript()
            .get(from..)
            .map(<[Turn]>::to_vec)
            .unwrap_or_default();
        if turns.is_empty() {
            return;
        }
        let inner = self.clone();
        spawn_local(async move {
            if let Err(e) = inner.threads.record(&turns).await {
                log::warn!("Could not store {} turns: {}", turns.len(), e);
            }
        });
    }
}

/// Build a client. The stored config is restored first, then `overrides`
/// (a partial config object, or `undefined`) is applied on top.
#[wasm_bindgen(js_name = createClient)]
pub async fn create_client(overrides: JsValue, session: Option<String>) -> std::result::Result<NsflowClient, JsValue> {
    let storage = auto_detect_storage();
    let preferences = PreferenceStore::new(storage.clone());
    let stored = preferences.load_config().await;

    let overrides = if overrides.is_undefined() || overrides.is_null() {
        None
    } else {
        Some(overrides.into_serde::<Value>().map_err(js_error)?)
    };
    let config = apply_overrides(stored, overrides).map_err(js_error)?;

    let session = session
        .filter(|s| !s.trim().is_empty())
        .map(SessionId::new)
        .unwrap_or_else(SessionId::generate);
    log::info!(
        "Client ready (session {}, storage {})",
        session,
        preferences.backend_name()
    );

    Ok(NsflowClient {
        inner: Rc::new(Dashboard::assemble(config, session, storage)),
    })
}

#[wasm_bindgen]
pub struct NsflowClient {
    inner: Rc<Dashboard>,
}

#[wasm_bindgen]
impl NsflowClient {
    #[wasm_bindgen(getter)]
    pub fn session(&self) -> String {
        self.inner.session.to_string()
    }

    pub fn config(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&self.inner.config)
    }

    /// Persist a config for the next `createClient`.
    #[wasm_bindgen(js_name = saveConfig)]
    pub fn save_config(&self, config: JsValue) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let patch = config.into_serde::<Value>().map_err(js_error)?;
            let config = apply_overrides(inner.config.clone(), Some(patch)).map_err(js_error)?;
            inner.preferences.save_config(&config).await.map_err(js_error)?;
            Ok(JsValue::TRUE)
        })
    }

    // ─── Conversation ────────────────────────────────────

    #[wasm_bindgen(js_name = selectAgent)]
    pub fn select_agent(&self, agent: &str) -> bool {
        self.inner.conversation.borrow_mut().select_agent(agent)
    }

    /// Returns whether the message went out.
    pub fn send(&self, text: &str) -> bool {
        let (from, delivery) = {
            let mut conversation = self.inner.conversation.borrow_mut();
            let from = conversation.transcript().len();
            (from, conversation.send(text))
        };
        self.inner.archive_since(from);
        delivery == Delivery::Sent
    }

    /// Fold pending frames into the transcript and return the transcript.
    pub fn poll(&self) -> std::result::Result<JsValue, JsValue> {
        let from = {
            let mut conversation = self.inner.conversation.borrow_mut();
            let from = conversation.transcript().len();
            conversation.poll();
            from
        };
        self.inner.archive_since(from);
        to_js(&self.inner.conversation.borrow().transcript())
    }

    pub fn transcript(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&self.inner.conversation.borrow().transcript())
    }

    #[wasm_bindgen(js_name = setSlyData)]
    pub fn set_sly_data(&self, data: JsValue) -> std::result::Result<(), JsValue> {
        let data = if data.is_undefined() || data.is_null() {
            Map::new()
        } else {
            data.into_serde::<Map<String, Value>>().map_err(js_error)?
        };
        self.inner.conversation.borrow_mut().set_sly_data(data);
        Ok(())
    }

    pub fn disconnect(&self) {
        self.inner.conversation.borrow_mut().disconnect();
    }

    pub fn clear(&self) {
        self.inner.conversation.borrow_mut().clear();
    }

    /// Lifecycle and transcript events since the last call
    #[wasm_bindgen(js_name = drainEvents)]
    pub fn drain_events(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&self.inner.events.drain())
    }

    // ─── Themes ──────────────────────────────────────────

    /// Resolves to the artifact, or `null` when none could be produced.
    pub fn theme(&self, subject: String, variant: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let variant = variant.parse::<Variant>().map_err(js_error)?;
            let artifact = inner.themes.get_or_generate(&subject, variant).await;
            to_js(&artifact)
        })
    }

    #[wasm_bindgen(js_name = refreshTheme)]
    pub fn refresh_theme(&self, subject: String, variant: String, hint: Option<String>) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let variant = variant.parse::<Variant>().map_err(js_error)?;
            let artifact = inner
                .themes
                .refresh(&subject, variant, hint.as_deref())
                .await;
            to_js(&artifact)
        })
    }

    pub fn preferences(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let prefs = inner.preferences.load_theme_preferences().await;
            to_js(&prefs)
        })
    }

    #[wasm_bindgen(js_name = setPreferences)]
    pub fn set_preferences(&self, enabled: bool, variant: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let variant = variant.parse::<Variant>().map_err(js_error)?;
            let prefs = ThemePreferences { enabled, variant };
            inner
                .preferences
                .save_theme_preferences(prefs)
                .await
                .map_err(js_error)?;
            to_js(&prefs)
        })
    }

    // ─── Widgets ─────────────────────────────────────────

    /// Ask the widget agent for a form based on the recent conversation.
    /// Resolves to `{spec, values}` or `null`.
    #[wasm_bindgen(js_name = requestWidget)]
    pub fn request_widget(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let context = inner
                .conversation
                .borrow()
                .recent_turns(WIDGET_CONTEXT_TURNS);
            let form = inner.widgets.request_widget(&context).await;
            if let Some(form) = &form {
                let spec = form.spec();
                let text = spec.description.clone().unwrap_or_else(|| spec.title.clone());
                let turn = Turn::agent(text, inner.config.widget_agent.clone());
                if let Err(e) = inner.threads.record_widget(&turn, spec).await {
                    log::warn!("Could not store widget '{}': {}", spec.title, e);
                }
            }
            let view = form.as_ref().map(WidgetView::of);
            let result = to_js(&view);
            *inner.form.borrow_mut() = form;
            result
        })
    }

    /// Edit one field of the current widget form; returns the field's report.
    #[wasm_bindgen(js_name = setWidgetField)]
    pub fn set_widget_field(&self, field: &str, value: JsValue) -> std::result::Result<JsValue, JsValue> {
        let value = value.into_serde::<Value>().map_err(js_error)?;
        let mut form = self.inner.form.borrow_mut();
        let form = form
            .as_mut()
            .ok_or_else(|| js_error("no widget form is open"))?;
        to_js(&form.set_field(field, value))
    }

    /// Validate the current form. Returns `{valid, values?, report?}`.
    #[wasm_bindgen(js_name = submitWidget)]
    pub fn submit_widget(&self) -> std::result::Result<JsValue, JsValue> {
        let mut form = self.inner.form.borrow_mut();
        let form = form
            .as_mut()
            .ok_or_else(|| js_error("no widget form is open"))?;
        let outcome = match form.submit() {
            Ok(values) => Submission {
                valid: true,
                values: Some(values),
                report: None,
            },
            Err(report) => Submission {
                valid: false,
                values: None,
                report: Some(report),
            },
        };
        to_js(&outcome)
    }

    // ─── Threads ─────────────────────────────────────────

    /// Resolves to the stored threads, most recently updated first.
    pub fn threads(&self) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let threads = inner.threads.list().await.map_err(js_error)?;
            to_js(&threads)
        })
    }

    /// Create a thread for the current agent and record into it from now on.
    #[wasm_bindgen(js_name = createThread)]
    pub fn create_thread(&self, title: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let agent = inner.conversation.borrow().target().map(str::to_string);
            let thread = inner
                .threads
                .create(&title, agent.as_deref())
                .await
                .map_err(js_error)?;
            to_js(&thread)
        })
    }

    /// Load a thread into the transcript and record into it from now on.
    /// Resolves to the thread, or `null` when it does not exist.
    #[wasm_bindgen(js_name = openThread)]
    pub fn open_thread(&self, id: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let detail = inner.threads.open(&id).await.map_err(js_error)?;
            if let Some(detail) = &detail {
                inner.conversation.borrow_mut().restore(detail.turns());
            }
            to_js(&detail)
        })
    }

    /// Resolves to whether the thread existed.
    #[wasm_bindgen(js_name = deleteThread)]
    pub fn delete_thread(&self, id: String) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let removed = inner.threads.delete(&id).await.map_err(js_error)?;
            Ok(JsValue::from_bool(removed))
        })
    }

    /// Stop recording into the active thread.
    #[wasm_bindgen(js_name = closeThread)]
    pub fn close_thread(&self) {
        self.inner.threads.close();
    }

    #[wasm_bindgen(js_name = activeThread)]
    pub fn active_thread(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&self.inner.threads.active())
    }

    /// One page of a thread's messages, oldest first.
    #[wasm_bindgen(js_name = threadMessages)]
    pub fn thread_messages(&self, id: String, limit: Option<u32>, offset: Option<u32>) -> Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let limit = limit.map_or(MESSAGE_PAGE_SIZE, |l| l as usize);
            let offset = offset.unwrap_or(0) as usize;
            let messages = inner
                .threads
                .messages(&id, limit, offset)
                .await
                .map_err(js_error)?;
            to_js(&messages)
        })
    }

    // ─── Server Logs ─────────────────────────────────────

    #[wasm_bindgen(js_name = connectLogs)]
    pub fn connect_logs(&self) -> bool {
        self.inner.logs.borrow_mut().connect()
    }

    /// Fold pending log frames into the history and return it.
    #[wasm_bindgen(js_name = pollLogs)]
    pub fn poll_logs(&self) -> std::result::Result<JsValue, JsValue> {
        let mut logs = self.inner.logs.borrow_mut();
        logs.poll();
        to_js(&logs.entries().collect::<Vec<_>>())
    }

    #[wasm_bindgen(js_name = disconnectLogs)]
    pub fn disconnect_logs(&self) {
        self.inner.logs.borrow_mut().disconnect();
    }

    #[wasm_bindgen(js_name = clearLogs)]
    pub fn clear_logs(&self) {
        self.inner.logs.borrow_mut().clear();
    }

    // ─── Validation ──────────────────────────────────────

    pub fn validate(&self, schema: JsValue, data: JsValue) -> std::result::Result<JsValue, JsValue> {
        let schema = schema.into_serde::<Value>().map_err(js_error)?;
        let data = data.into_serde::<Value>().map_err(js_error)?;
        to_js(&self.inner.validator.validate(&schema, &data))
    }

    #[wasm_bindgen(js_name = clearValidatorCache)]
    pub fn clear_validator_cache(&self) {
        self.inner.validator.clear_validator_cache();
    }
}

#[derive(Serialize)]
struct WidgetView<'a> {
    spec: &'a WidgetSpec,
    values: &'a Map<String, Value>,
}

impl<'a> WidgetView<'a> {
    fn of(form: &'a WidgetForm) -> Self {
        Self {
            spec: form.spec(),
            values: form.values(),
        }
    }
}

#[derive(Serialize)]
struct Submission {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ValidationReport>,
}

/// Overlay a partial config object onto `base` and validate the result.
fn apply_overrides(base: ClientConfig, overrides: Option<Value>) -> Result<ClientConfig> {
    let config = match overrides {
        None => base,
        Some(Value::Object(patch)) => {
            let mut merged = match serde_json::to_value(&base)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            merged.extend(patch);
            serde_json::from_value(Value::Object(merged))?
        }
        Some(other) => {
            return Err(ClientError::Config(format!(
                "config overrides must be an object, got {}",
                other
            )));
        }
    };
    config.validate()?;
    Ok(config)
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> std::result::Result<JsValue, JsValue> {
    JsValue::from_serde(value).map_err(js_error)
}

fn js_error(e: impl Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}
