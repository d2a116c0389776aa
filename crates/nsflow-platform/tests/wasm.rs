//! WASM-target tests for nsflow-platform (Node.js runtime).
//!
//! Tests MemoryStorage, BrowserTimer and HTTP endpoint building under
//! wasm32-unknown-unknown via `wasm-pack test --node`.
//!
//! WebSocket and localStorage need a browser and are not covered here.

use wasm_bindgen_test::*;

use nsflow_core::ports::{StoragePort, TimerPort};
use nsflow_core::preferences::{PreferenceStore, THEME_VARIANT_KEY};
use nsflow_platform::http::{HttpArtifactStore, HttpConnectivitySource, HttpThreadStore};
use nsflow_platform::storage::MemoryStorage;
use nsflow_platform::timer::BrowserTimer;
use nsflow_types::artifact::Variant;
use nsflow_types::config::ThemePreferences;
use std::rc::Rc;

// ─── MemoryStorage Tests ─────────────────────────────────

#[wasm_bindgen_test]
fn memory_storage_backend_name() {
    let storage = MemoryStorage::new();
    assert_eq!(storage.backend_name(), "memory");
}

#[wasm_bindgen_test]
async fn memory_storage_get_missing() {
    let storage = MemoryStorage::new();
    assert!(storage.get("nonexistent").await.unwrap().is_none());
    assert!(!storage.exists("nonexistent").await.unwrap());
}

#[wasm_bindgen_test]
async fn memory_storage_set_overwrite_delete() {
    let storage = MemoryStorage::new();
    storage.set("key", "v1").await.unwrap();
    storage.set("key", "v2").await.unwrap();
    assert_eq!(storage.get("key").await.unwrap().as_deref(), Some("v2"));
    assert_eq!(storage.len(), 1);

    storage.delete("key").await.unwrap();
    assert!(storage.is_empty());
}

#[wasm_bindgen_test]
async fn preferences_over_memory_storage() {
    let storage = Rc::new(MemoryStorage::new());
    let port: Rc<dyn StoragePort> = storage.clone();
    let prefs = PreferenceStore::new(port);

    let wanted = ThemePreferences {
        enabled: true,
        variant: Variant::Static,
    };
    prefs.save_theme_preferences(wanted).await.unwrap();
    assert_eq!(
        storage.get(THEME_VARIANT_KEY).await.unwrap().as_deref(),
        Some("static")
    );
    assert_eq!(prefs.load_theme_preferences().await, wanted);
}

// ─── Timer Tests ─────────────────────────────────────────

#[wasm_bindgen_test]
async fn browser_timer_sleep_completes() {
    BrowserTimer.sleep(5).await;
}

// ─── HTTP Endpoint Tests ─────────────────────────────────

#[wasm_bindgen_test]
fn artifact_store_url_encodes_subject() {
    let store = HttpArtifactStore::new("http://localhost:4173/");
    assert_eq!(
        store.record_url("smart home/v2"),
        "http://localhost:4173/api/v1/themes/smart%20home%2Fv2"
    );
}

#[wasm_bindgen_test]
fn connectivity_url() {
    let source = HttpConnectivitySource::new("http://localhost:4173");
    assert_eq!(
        source.network_url("hello_world"),
        "http://localhost:4173/api/v1/connectivity/hello_world"
    );
}

#[wasm_bindgen_test]
fn artifact_store_encodes_like_channels() {
    let store = HttpArtifactStore::new("http://localhost:4173");
    assert!(store.record_url("a(b)~c").ends_with("/a(b)~c"));
    assert!(store.record_url("q?x=1").ends_with("/q%3Fx%3D1"));
}

#[wasm_bindgen_test]
fn thread_store_urls() {
    let store = HttpThreadStore::new("http://localhost:4173/");
    assert_eq!(store.threads_url(), "http://localhost:4173/api/v1/cruse/threads");
    assert_eq!(
        store.messages_url("t 1"),
        "http://localhost:4173/api/v1/cruse/threads/t%201/messages"
    );
}
