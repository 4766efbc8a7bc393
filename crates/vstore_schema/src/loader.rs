//! Dynamic schema loader.
//!
//! Three control values live under the configured root:
//!
//! - `<root>.action`: `Load | Unload | OverWrite`
//! - `<root>.file`: fragment path, resolved against the base directory
//! - `<root>.status`: `None | FileNotFound | Complete | Failed` (read-only)
//!
//! Writing `action` or `file` runs the selected action on the named file and
//! reports the outcome through `status`. Failures are not retried; call
//! [`DynamicLoader::trigger`] to re-issue.

use crate::config::LoaderConfig;
use crate::error::{SchemaError, SchemaResult};
use crate::fragment::Fragment;
use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use vstore_core::{
    Access, Data, Kind, Provenance, StoreError, StoreEvent, Subscription, Value, ValueId,
    ValueStore,
};

/// Action selected through the control value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderAction {
    /// Merge the fragment into the live tree.
    Load,
    /// Remove what the fragment declares.
    Unload,
    /// Wipe instance data and reassert declared values.
    OverWrite,
}

const ACTIONS: [(&str, i64); 3] = [("Load", 0), ("Unload", 1), ("OverWrite", 2)];

impl LoaderAction {
    /// Returns the enumerator value.
    pub fn code(self) -> i64 {
        match self {
            LoaderAction::Load => 0,
            LoaderAction::Unload => 1,
            LoaderAction::OverWrite => 2,
        }
    }

    /// Looks up an action by enumerator value.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LoaderAction::Load),
            1 => Some(LoaderAction::Unload),
            2 => Some(LoaderAction::OverWrite),
            _ => None,
        }
    }

    /// Returns the payload selecting this action.
    pub fn data(self) -> Data {
        Data::enumeration(self.code(), ACTIONS)
    }
}

/// Outcome reported through the status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing has run yet.
    None,
    /// The named file does not exist.
    FileNotFound,
    /// The last action succeeded.
    Complete,
    /// The last action failed.
    Failed,
}

const STATUSES: [(&str, i64); 4] = [
    ("None", 0),
    ("FileNotFound", 1),
    ("Complete", 2),
    ("Failed", 3),
];

impl LoadStatus {
    /// Returns the enumerator value.
    pub fn code(self) -> i64 {
        match self {
            LoadStatus::None => 0,
            LoadStatus::FileNotFound => 1,
            LoadStatus::Complete => 2,
            LoadStatus::Failed => 3,
        }
    }

    /// Looks up a status by enumerator value.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LoadStatus::None),
            1 => Some(LoadStatus::FileNotFound),
            2 => Some(LoadStatus::Complete),
            3 => Some(LoadStatus::Failed),
            _ => None,
        }
    }

    /// Returns the payload reporting this status.
    pub fn data(self) -> Data {
        Data::enumeration(self.code(), STATUSES)
    }
}

/// Non-container values of a scratch store, parents before children.
fn leaves(scratch: &ValueStore) -> Vec<Value> {
    scratch
        .values()
        .into_iter()
        .filter(|value| value.kind() != Kind::Container)
        .collect()
}

fn scratch(fragment: &Fragment) -> SchemaResult<ValueStore> {
    let scratch = ValueStore::new();
    fragment.declare_into(&scratch)?;
    Ok(scratch)
}

/// Merges a fragment into `store`.
///
/// Container schemas are registered (replacing an older schema of the same
/// container); declared values are created when absent. Nothing is removed
/// and existing payloads are kept.
pub fn load(store: &ValueStore, fragment: &Fragment) -> SchemaResult<()> {
    let scratch = scratch(fragment)?;
    let schemas = scratch.container_schemas();
    for schema in &schemas {
        store.declare_container(schema.clone())?;
    }
    let mut created = 0;
    for value in leaves(&scratch) {
        if !store.has(&value.id) {
            store.declare(&value.id, value.data, value.access)?;
            created += 1;
        }
    }
    info!(containers = schemas.len(), created, "fragment loaded");
    Ok(())
}

/// Removes what a fragment declares from `store`.
///
/// Every declared container goes away with its schema and instance data. A
/// declared value is removed only when it has no children in the live tree,
/// so data another fragment still hangs below it survives.
pub fn unload(store: &ValueStore, fragment: &Fragment) -> SchemaResult<()> {
    let scratch = scratch(fragment)?;
    let schemas = scratch.container_schemas();
    for schema in &schemas {
        store.remove(&schema.id, Provenance::Local)?;
        store.remove_container_schema(&schema.id);
    }

    let mut removed = 0;
    let mut kept = 0;
    for value in leaves(&scratch).into_iter().rev() {
        if !store.has(&value.id) {
            continue;
        }
        if store.has_children(&value.id) {
            debug!(id = %value.id, "kept; still has children");
            kept += 1;
            continue;
        }
        store.remove(&value.id, Provenance::Local)?;
        removed += 1;
    }
    info!(containers = schemas.len(), removed, kept, "fragment unloaded");
    Ok(())
}

/// Reloads a fragment into `store`.
///
/// Every declared container loses all of its live keys but keeps its
/// identity and schema; every declared value is reset to the fragment's
/// payload.
pub fn reload(store: &ValueStore, fragment: &Fragment) -> SchemaResult<()> {
    let scratch = scratch(fragment)?;
    let mut erased = 0;
    for schema in scratch.container_schemas() {
        if store.kind(&schema.id) != Some(Kind::Container) {
            store.declare_container(schema)?;
            continue;
        }
        for key in store.keys(&schema.id)? {
            if store.remove_from_container(&schema.id, &key, Provenance::Local)? {
                erased += 1;
            }
        }
        if store.container_schema(&schema.id).is_none() {
            store.declare_container(schema)?;
        }
    }
    let values = leaves(&scratch);
    for value in &values {
        store.declare(&value.id, value.data.clone(), value.access)?;
    }
    info!(erased, values = values.len(), "fragment reloaded");
    Ok(())
}

/// Runs fragment actions driven by control values in a store.
pub struct DynamicLoader {
    store: Arc<ValueStore>,
    config: LoaderConfig,
    action_id: ValueId,
    file_id: ValueId,
    status_id: ValueId,
    _listener: Subscription,
}

impl DynamicLoader {
    /// Declares the control values under `config.root` and starts watching
    /// them.
    ///
    /// Control values that already exist keep their payload.
    pub fn attach(store: Arc<ValueStore>, config: LoaderConfig) -> SchemaResult<Arc<Self>> {
        let action_id = config.root.join("action")?;
        let file_id = config.root.join("file")?;
        let status_id = config.root.join("status")?;

        declare_missing(&store, &action_id, LoaderAction::Load.data(), Access::ReadWrite)?;
        declare_missing(&store, &file_id, Data::text(""), Access::ReadWrite)?;
        declare_missing(&store, &status_id, LoadStatus::None.data(), Access::ReadOnly)?;
        debug!(root = %config.root, "loader attached");

        Ok(Arc::new_cyclic(|self_ref: &Weak<DynamicLoader>| {
            let loader = self_ref.clone();
            let watched = [action_id.clone(), file_id.clone()];
            let listener = store.observe(move |event: &StoreEvent| {
                if !matches!(event, StoreEvent::Added { .. } | StoreEvent::Changed { .. }) {
                    return;
                }
                if !watched.contains(event.id()) {
                    return;
                }
                if let Some(loader) = loader.upgrade() {
                    loader.trigger();
                }
            });
            Self {
                store,
                config,
                action_id,
                file_id,
                status_id,
                _listener: listener,
            }
        }))
    }

    /// Returns the loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns the ID of the action control value.
    pub fn action_id(&self) -> &ValueId {
        &self.action_id
    }

    /// Returns the ID of the file control value.
    pub fn file_id(&self) -> &ValueId {
        &self.file_id
    }

    /// Returns the ID of the status value.
    pub fn status_id(&self) -> &ValueId {
        &self.status_id
    }

    /// Returns the last reported status.
    pub fn status(&self) -> LoadStatus {
        self.store
            .get(&self.status_id)
            .and_then(|value| value.data.as_enum().map(|e| e.value))
            .and_then(LoadStatus::from_code)
            .unwrap_or(LoadStatus::None)
    }

    /// Runs the current action on the current file and reports the outcome.
    ///
    /// Does nothing while the file value is empty.
    pub fn trigger(&self) -> LoadStatus {
        let file = self
            .store
            .get(&self.file_id)
            .and_then(|value| value.data.as_text().map(str::to_owned))
            .unwrap_or_default();
        if file.is_empty() {
            debug!("no fragment file selected");
            return self.status();
        }

        let outcome = self.action().and_then(|action| self.run(action, Path::new(&file)));
        let status = match outcome {
            Ok(()) => LoadStatus::Complete,
            Err(e) if e.is_file_not_found() => {
                warn!(file = %file, "fragment file not found");
                LoadStatus::FileNotFound
            }
            Err(e) => {
                warn!(file = %file, error = %e, "fragment action failed");
                LoadStatus::Failed
            }
        };
        if let Err(e) = self
            .store
            .declare(&self.status_id, status.data(), Access::ReadOnly)
        {
            warn!(error = %e, "could not report loader status");
        }
        status
    }

    /// Loads a fragment file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> SchemaResult<()> {
        self.run(LoaderAction::Load, path.as_ref())
    }

    /// Unloads a fragment file.
    pub fn unload_file(&self, path: impl AsRef<Path>) -> SchemaResult<()> {
        self.run(LoaderAction::Unload, path.as_ref())
    }

    /// Reloads a fragment file.
    pub fn reload_file(&self, path: impl AsRef<Path>) -> SchemaResult<()> {
        self.run(LoaderAction::OverWrite, path.as_ref())
    }

    fn action(&self) -> SchemaResult<LoaderAction> {
        let code = self
            .store
            .get(&self.action_id)
            .and_then(|value| value.data.as_enum().map(|e| e.value))
            .ok_or_else(|| StoreError::NotFound(self.action_id.clone()))?;
        LoaderAction::from_code(code).ok_or(SchemaError::UnknownAction(code))
    }

    fn run(&self, action: LoaderAction, path: &Path) -> SchemaResult<()> {
        let path = self.config.resolve(path);
        debug!(?action, path = %path.display(), "running fragment action");
        let fragment = Fragment::read(&path)?;
        match action {
            LoaderAction::Load => load(&self.store, &fragment),
            LoaderAction::Unload => unload(&self.store, &fragment),
            LoaderAction::OverWrite => reload(&self.store, &fragment),
        }
    }
}

fn declare_missing(store: &ValueStore, id: &ValueId, data: Data, access: Access) -> SchemaResult<()> {
    if !store.has(id) {
        store.declare(id, data, access)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use vstore_core::IntWidth;

    const NET: &str = r#"{
        "containers": [
            { "id": "net.iface", "template": [
                { "id": "net.iface.+.mtu", "data": { "unsigned": { "width": "u16", "value": 1500 } } }
            ] }
        ],
        "values": [
            { "id": "net", "data": "struct" },
            { "id": "net.hostname", "data": { "text": "edge" } }
        ]
    }"#;

    fn id(s: &str) -> ValueId {
        ValueId::parse(s).unwrap()
    }

    fn fragment() -> Fragment {
        Fragment::parse(NET).unwrap()
    }

    #[test]
    fn action_and_status_codes() {
        for action in [LoaderAction::Load, LoaderAction::Unload, LoaderAction::OverWrite] {
            assert_eq!(LoaderAction::from_code(action.code()), Some(action));
        }
        assert_eq!(LoaderAction::from_code(7), None);
        assert_eq!(
            LoadStatus::Failed.data().as_enum().unwrap().name(),
            Some("Failed")
        );
    }

    #[test]
    fn load_keeps_existing_payloads() {
        let store = ValueStore::new();
        store
            .set(&id("net.hostname"), Data::text("custom"), Provenance::Local)
            .unwrap();
        load(&store, &fragment()).unwrap();
        assert_eq!(
            store.get(&id("net.hostname")).unwrap().data,
            Data::text("custom")
        );
        assert_eq!(store.kind(&id("net.iface")), Some(Kind::Container));
    }

    #[test]
    fn unload_removes_declared_tree() {
        let store = ValueStore::new();
        load(&store, &fragment()).unwrap();
        store
            .add_to_container(&id("net.iface"), "eth0", Provenance::Local)
            .unwrap();
        unload(&store, &fragment()).unwrap();
        assert!(!store.has(&id("net.iface")));
        assert!(!store.has(&id("net.iface.eth0.mtu")));
        assert!(store.container_schema(&id("net.iface")).is_none());
        assert!(!store.has(&id("net.hostname")));
        assert!(!store.has(&id("net")));
    }

    #[test]
    fn unload_keeps_values_with_foreign_children() {
        let store = ValueStore::new();
        load(&store, &fragment()).unwrap();
        store
            .set(&id("net.dns"), Data::text("1.1.1.1"), Provenance::Local)
            .unwrap();
        unload(&store, &fragment()).unwrap();
        assert!(store.has(&id("net")));
        assert!(store.has(&id("net.dns")));
        assert!(!store.has(&id("net.hostname")));
    }

    #[test]
    fn reload_wipes_instances_and_resets_values() {
        let store = ValueStore::new();
        load(&store, &fragment()).unwrap();
        let schema = store.container_schema(&id("net.iface")).unwrap();
        store
            .add_to_container(&id("net.iface"), "eth0", Provenance::Local)
            .unwrap();
        store
            .set(&id("net.hostname"), Data::text("changed"), Provenance::Local)
            .unwrap();

        reload(&store, &fragment()).unwrap();
        assert!(store.keys(&id("net.iface")).unwrap().is_empty());
        assert!(!store.has(&id("net.iface.eth0")));
        assert_eq!(store.container_schema(&id("net.iface")).unwrap(), schema);
        assert_eq!(
            store.get(&id("net.hostname")).unwrap().data,
            Data::text("edge")
        );
    }

    #[test]
    fn invalid_fragment_leaves_live_tree_untouched() {
        let store = ValueStore::new();
        let bad = Fragment::parse(
            r#"{ "values": [
                { "id": "a", "data": { "text": "x" } },
                { "id": "a", "data": { "bool": true } }
            ] }"#,
        )
        .unwrap();
        assert!(load(&store, &bad).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn control_values_drive_actions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("net.json"), NET).unwrap();

        let store = Arc::new(ValueStore::new());
        let loader = DynamicLoader::attach(
            Arc::clone(&store),
            LoaderConfig::default().with_base_dir(dir.path()),
        )
        .unwrap();
        assert_eq!(loader.status(), LoadStatus::None);
        assert!(store.get(loader.status_id()).unwrap().is_read_only());

        store
            .set(loader.file_id(), Data::text("net.json"), Provenance::Local)
            .unwrap();
        assert_eq!(loader.status(), LoadStatus::Complete);
        assert_eq!(
            store.get(&id("net.iface.+.mtu")).map(|v| v.data),
            None,
            "template entries are not live values"
        );
        assert!(store.has(&id("net.hostname")));

        store
            .set(loader.action_id(), LoaderAction::Unload.data(), Provenance::Local)
            .unwrap();
        assert_eq!(loader.status(), LoadStatus::Complete);
        assert!(!store.has(&id("net.hostname")));

        store
            .set(loader.file_id(), Data::text("missing.json"), Provenance::Local)
            .unwrap();
        assert_eq!(loader.status(), LoadStatus::FileNotFound);

        fs::write(dir.path().join("missing.json"), NET).unwrap();
        store
            .set(loader.action_id(), LoaderAction::Load.data(), Provenance::Local)
            .unwrap();
        assert_eq!(loader.status(), LoadStatus::Complete);
        assert_eq!(
            store.get(&id("net.hostname")).unwrap().data,
            Data::text("edge")
        );
    }

    #[test]
    fn failed_action_reports_failed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "not json").unwrap();
        let store = Arc::new(ValueStore::new());
        let loader = DynamicLoader::attach(
            Arc::clone(&store),
            LoaderConfig::default().with_base_dir(dir.path()),
        )
        .unwrap();
        store
            .set(loader.file_id(), Data::text("bad.json"), Provenance::Local)
            .unwrap();
        assert_eq!(loader.status(), LoadStatus::Failed);

        fs::write(dir.path().join("bad.json"), NET).unwrap();
        assert_eq!(loader.trigger(), LoadStatus::Complete);
        assert_eq!(
            store.get(&id("net.iface")).unwrap().kind(),
            Kind::Container
        );
    }

    #[test]
    fn direct_calls_resolve_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("net.json"), NET).unwrap();
        let store = Arc::new(ValueStore::new());
        let loader = DynamicLoader::attach(
            Arc::clone(&store),
            LoaderConfig::new(id("ctl")).with_base_dir(dir.path()),
        )
        .unwrap();
        assert!(store.has(&id("ctl.action")));

        loader.load_file("net.json").unwrap();
        store
            .add_to_container(&id("net.iface"), "eth0", Provenance::Local)
            .unwrap();
        assert_eq!(
            store.get(&id("net.iface.eth0.mtu")).unwrap().data,
            Data::unsigned(IntWidth::U16, 1500)
        );
        loader.reload_file("net.json").unwrap();
        assert!(!store.has(&id("net.iface.eth0")));
        loader.unload_file("net.json").unwrap();
        assert!(!store.has(&id("net.iface")));
        assert!(loader.load_file("nope.json").unwrap_err().is_file_not_found());
    }
}
