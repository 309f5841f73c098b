//! In-memory engine used by unit tests.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc,
    },
    time::Duration,
};

use serde_json::{Map, Value};

use crate::{
    engine::{
        Engine,
        EngineError,
        EngineIndex,
        EngineResult,
        Hit,
        StoredDocument,
        StoredField,
        StoredValue,
    },
    query::SearchRequest,
};

#[derive(Default)]
pub struct MockEngine {
    pub opens: AtomicUsize,
    pub creates: AtomicUsize,
    pub fail_create: AtomicBool,
    pub delay: Duration,
    existing: Mutex<HashSet<PathBuf>>,
    gate: Option<Gate>,
}

/// Blocks engine calls for one index until released.
struct Gate {
    name: String,
    entered: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl MockEngine {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// An engine whose open/create for `name` waits for a release signal.
    /// Returns the engine, a receiver notified when the call is entered,
    /// and the sender that releases it.
    pub fn gated(
        name: &str,
    ) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Self {
            gate: Some(Gate {
                name: name.to_string(),
                entered: entered_tx,
                release: Mutex::new(release_rx),
            }),
            ..Self::default()
        };
        (engine, entered_rx, release_tx)
    }

    fn wait_gate(&self, path: &Path) {
        if let Some(gate) = &self.gate {
            if path.ends_with(&gate.name) {
                let _ = gate.entered.send(());
                let _ = gate.release.lock().unwrap().recv();
            }
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl Engine for MockEngine {
    type Index = MockIndex;

    fn open(&self, path: &Path) -> EngineResult<MockIndex> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.wait_gate(path);
        if self.existing.lock().unwrap().contains(path) {
            Ok(MockIndex::default())
        } else {
            Err(EngineError::NotFound(path.display().to_string()))
        }
    }

    fn create(&self, path: &Path) -> EngineResult<MockIndex> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Io(std::io::Error::other("disk full")));
        }
        self.existing.lock().unwrap().insert(path.to_path_buf());
        Ok(MockIndex::default())
    }
}

#[derive(Default)]
pub struct MockIndex {
    pub docs: Mutex<Vec<(String, Map<String, Value>)>>,
    pub closes: Arc<AtomicUsize>,
    pub fail_close: AtomicBool,
    pub fail_count: AtomicBool,
}

impl EngineIndex for MockIndex {
    fn index(&self, id: &str, fields: &Map<String, Value>) -> EngineResult<()> {
        let mut docs = self.docs.lock().unwrap();
        docs.retain(|(existing, _)| existing != id);
        docs.push((id.to_string(), fields.clone()));
        Ok(())
    }

    fn delete(&self, id: &str) -> EngineResult<()> {
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|(existing, _)| existing != id);
        if docs.len() == before {
            return Err(EngineError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn search(&self, request: &SearchRequest) -> EngineResult<Vec<Hit>> {
        if !request.query.is_match_all() {
            return Err(EngineError::Query("mock only matches all".into()));
        }
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .iter()
            .skip(request.from)
            .take(request.size)
            .map(|(id, _)| Hit {
                id: id.clone(),
                score: 1.0,
            })
            .collect())
    }

    fn document(&self, id: &str) -> EngineResult<StoredDocument> {
        let docs = self.docs.lock().unwrap();
        let (_, fields) = docs
            .iter()
            .find(|(existing, _)| existing == id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let fields = fields
            .iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    Value::String(s) => StoredValue::Text(s.clone()),
                    Value::Number(n) => StoredValue::Number(n.clone()),
                    Value::Bool(b) => StoredValue::Boolean(*b),
                    _ => return None,
                };
                Some(StoredField::new(name.clone(), value))
            })
            .collect();
        Ok(StoredDocument {
            id: id.to_string(),
            fields,
        })
    }

    fn doc_count(&self) -> EngineResult<u64> {
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(EngineError::Io(std::io::Error::other("count failed")));
        }
        Ok(self.docs.lock().unwrap().len() as u64)
    }

    fn close(&self) -> EngineResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(EngineError::Io(std::io::Error::other("close failed")));
        }
        Ok(())
    }
}
