//! Shared test adapters.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ccscout::adapters::{FetchContext, SourceAdapter, SourceError};
use ccscout::core::{LicenseClassifier, LicenseTable, SourceFanoutAggregator};
use ccscout::domain::{ContentKind, SourceResult};

/// What a scripted adapter does on its next call
#[derive(Clone)]
pub enum Behaviour {
    Return(Vec<SourceResult>),
    Fail(SourceError),
    Sleep(Duration),
}

/// Adapter whose answer is scripted by the test
pub struct ScriptedAdapter {
    name: String,
    behaviour: Mutex<Behaviour>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behaviour: Mutex::new(behaviour),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn returning(name: &str, items: Vec<SourceResult>) -> Arc<Self> {
        Self::new(name, Behaviour::Return(items))
    }

    pub fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        _query: &str,
        _limit: usize,
        _ctx: &FetchContext,
    ) -> Result<Vec<SourceResult>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.lock().unwrap().clone();
        match behaviour {
            Behaviour::Return(items) => Ok(items),
            Behaviour::Fail(err) => Err(err),
            Behaviour::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(Vec::new())
            }
        }
    }
}

/// A usable result with a unique URL and title
pub fn item(source: &str, id: &str) -> SourceResult {
    SourceResult::new(
        source,
        id,
        format!("{} item {}", source, id),
        format!("https://{}.example/{}", source.to_lowercase(), id),
        "CC BY 4.0",
        ContentKind::Video,
    )
}

/// `n` distinct usable results
pub fn items(source: &str, n: usize) -> Vec<SourceResult> {
    (0..n).map(|i| item(source, &i.to_string())).collect()
}

pub fn quota_error(source: &str) -> SourceError {
    SourceError::QuotaExceeded {
        provider: source.to_string(),
    }
}

pub fn aggregator(timeout: Duration) -> SourceFanoutAggregator {
    SourceFanoutAggregator::new(Arc::new(LicenseClassifier::new(LicenseTable::default())))
        .with_timeout(timeout)
}

pub fn adapters(list: &[Arc<ScriptedAdapter>]) -> Vec<Arc<dyn SourceAdapter>> {
    list.iter()
        .map(|a| a.clone() as Arc<dyn SourceAdapter>)
        .collect()
}
