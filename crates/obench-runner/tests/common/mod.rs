//! Shared fakes for runner tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use obench_db::{ResultLogRow, ResultStore, StoreError};
use obench_lib::benchmark::TestDefinition;
use obench_lib::notify::RunObserver;
use obench_lib::ollama::{ChatReply, InferenceClient, InferenceError, ProcessEntry};
use obench_types::{ModelSummary, RunFailure, Stats, TestCase};
use serde_json::{Map, Value};

/// Answers prompts from a table; scripted replies take precedence while they last.
#[derive(Default)]
pub struct MockClient {
    answers: HashMap<String, String>,
    script: Mutex<VecDeque<Result<ChatReply, InferenceError>>>,
    calls: Mutex<Vec<(String, String)>>,
    /// `process_entry` reports the model as not loaded this many times first
    unloaded_polls: usize,
    polls: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, prompt: &str, text: &str) -> Self {
        self.answers.insert(prompt.to_string(), text.to_string());
        self
    }

    pub fn script(self, reply: Result<ChatReply, InferenceError>) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn loaded_after(mut self, polls: usize) -> Self {
        self.unloaded_polls = polls;
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

pub fn stats(eval_count: u64, eval_duration_ns: u64) -> Stats {
    Stats {
        prompt_eval_count: Some(12),
        eval_count: Some(eval_count),
        prompt_eval_duration: Some(100_000_000),
        eval_duration: Some(eval_duration_ns),
        total_duration: Some(eval_duration_ns + 100_000_000),
        load_duration: None,
    }
}

pub fn reply(text: &str, stats: Stats) -> Result<ChatReply, InferenceError> {
    Ok(ChatReply {
        text: text.to_string(),
        stats,
    })
}

#[async_trait]
impl InferenceClient for MockClient {
    async fn chat(&self, model: &str, prompt: &str) -> Result<ChatReply, InferenceError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        if let Some(scripted) = self.script.lock().unwrap().pop_front() {
            return scripted;
        }
        match self.answers.get(prompt) {
            Some(text) => reply(text, stats(10, 1_000_000_000)),
            None => Err(InferenceError::EmptyResponse),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelSummary>, InferenceError> {
        Ok(vec![model("llama3:8b", Some(8.0))])
    }

    async fn process_entry(&self, _model: &str) -> Result<Option<ProcessEntry>, InferenceError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        if poll < self.unloaded_polls {
            return Ok(None);
        }
        Ok(Some(ProcessEntry {
            size: 5_000_000_000,
            size_vram: 5_000_000_000,
            context_length: Some(4096),
        }))
    }

    async fn model_info(&self, _model: &str) -> Result<Option<Map<String, Value>>, InferenceError> {
        Ok(None)
    }
}

/// Remembers every failure it is told about.
#[derive(Default)]
pub struct RecordingObserver {
    failures: Mutex<Vec<RunFailure>>,
}

impl RecordingObserver {
    pub fn failures(&self) -> Vec<RunFailure> {
        self.failures.lock().unwrap().clone()
    }
}

impl RunObserver for RecordingObserver {
    fn notify(&self, failure: &RunFailure) {
        self.failures.lock().unwrap().push(failure.clone());
    }
}

/// A store whose writes always fail.
pub struct BrokenStore;

#[async_trait]
impl ResultStore for BrokenStore {
    async fn append_rows(&self, _rows: &[ResultLogRow]) -> obench_db::Result<usize> {
        Err(StoreError::remote("disk full"))
    }

    async fn read_all_rows(&self) -> obench_db::Result<Vec<ResultLogRow>> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> obench_db::Result<()> {
        Ok(())
    }

    fn location(&self) -> String {
        "broken://".to_string()
    }
}

pub fn model(name: &str, size_b: Option<f64>) -> ModelSummary {
    ModelSummary {
        name: name.to_string(),
        parameter_size_text: size_b.map(|s| format!("{s}B")).unwrap_or_default(),
        size_b,
        size_bytes: Some(4_700_000_000),
    }
}

pub fn addition(repeat_count: u32) -> TestDefinition {
    TestDefinition::new(
        "simple-addition",
        "Simple Addition",
        vec![
            TestCase::literal("1+1", "Compute: 1+1.", "2"),
            TestCase::literal("3+2", "Compute: 3+2.", "5"),
        ],
        repeat_count,
    )
    .unwrap()
}

pub fn division(repeat_count: u32) -> TestDefinition {
    TestDefinition::new(
        "compound-division",
        "Compound Division",
        vec![TestCase::numeric("25/5/2", "Compute: 25/5/2.", "2.5")],
        repeat_count,
    )
    .unwrap()
}
