//! Task fixtures shared by the integration tests
#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tessera_engine::{BoxError, CachableTask, CallArgs, Field, TaskContext, TaskNode, TaskState};

/// Counts `run` executions across task instances
pub type Runs = Rc<Cell<u32>>;

pub fn runs() -> Runs {
    Rc::new(Cell::new(0))
}

/// Leaf task: multiplies `x` by ten
pub struct Source {
    pub x: i64,
    pub note: String,
    pub runs: Runs,
    pub state: TaskState,
}

impl Source {
    pub fn new(x: i64, runs: &Runs) -> Self {
        Self {
            x,
            note: "scratch".into(),
            runs: Rc::clone(runs),
            state: TaskState::new(),
        }
    }
}

impl TaskNode for Source {
    fn task_name(&self) -> &str {
        "Source"
    }
    fn definition(&self) -> &str {
        "source-v1"
    }
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::plain("x", &self.x),
            Field::plain("note", &self.note).transient(),
            Field::tool("runs"),
        ]
    }
    fn state(&self) -> &TaskState {
        &self.state
    }
}

impl CachableTask for Source {
    type Output = i64;

    fn run(&mut self, ctx: &mut TaskContext<'_>, call: &CallArgs) -> Result<i64, BoxError> {
        self.runs.set(self.runs.get() + 1);
        ctx.info(format!("source x={}", self.x));
        let factor = call.get_arg(0).and_then(|v| v.as_i64()).unwrap_or(10);
        Ok(self.x * factor)
    }
}

/// Parent task owning a [`Source`] and running it through the cache
pub struct Pipeline {
    pub label: String,
    pub source: Source,
    pub accept: Rc<Cell<bool>>,
    pub runs: Runs,
    pub state: TaskState,
}

impl Pipeline {
    pub fn new(x: i64, pipeline_runs: &Runs, source_runs: &Runs) -> Self {
        Self {
            label: "pipe".into(),
            source: Source::new(x, source_runs),
            accept: Rc::new(Cell::new(true)),
            runs: Rc::clone(pipeline_runs),
            state: TaskState::new(),
        }
    }
}

impl TaskNode for Pipeline {
    fn task_name(&self) -> &str {
        "Pipeline"
    }
    fn definition(&self) -> &str {
        "pipeline-v1"
    }
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::plain("label", &self.label),
            Field::subtask("source", &self.source),
            Field::tool("accept"),
            Field::tool("runs"),
        ]
    }
    fn state(&self) -> &TaskState {
        &self.state
    }
    fn check_is_cache_valid(&self, _result: &serde_json::Value) -> bool {
        self.accept.get()
    }
}

impl CachableTask for Pipeline {
    type Output = String;

    fn run(&mut self, ctx: &mut TaskContext<'_>, _call: &CallArgs) -> Result<String, BoxError> {
        self.runs.set(self.runs.get() + 1);
        let value = ctx.get_or_compute(&mut self.source, &CallArgs::new())?;
        ctx.info(format!("pipeline got {value}"));
        Ok(format!("{}:{value}", self.label))
    }
}

/// Task whose `run` always fails
pub struct Failing {
    pub state: TaskState,
}

impl TaskNode for Failing {
    fn task_name(&self) -> &str {
        "Failing"
    }
    fn definition(&self) -> &str {
        "1"
    }
    fn fields(&self) -> Vec<Field<'_>> {
        Vec::new()
    }
    fn state(&self) -> &TaskState {
        &self.state
    }
}

impl CachableTask for Failing {
    type Output = ();

    fn run(&mut self, _ctx: &mut TaskContext<'_>, _call: &CallArgs) -> Result<(), BoxError> {
        Err(std::io::Error::other("disk on fire").into())
    }
}

/// Parent whose sub-task fails when run
pub struct Supervisor {
    pub child: Failing,
    pub state: TaskState,
}

impl TaskNode for Supervisor {
    fn task_name(&self) -> &str {
        "Supervisor"
    }
    fn definition(&self) -> &str {
        "1"
    }
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::subtask("child", &self.child)]
    }
    fn state(&self) -> &TaskState {
        &self.state
    }
}

impl CachableTask for Supervisor {
    type Output = ();

    fn run(&mut self, ctx: &mut TaskContext<'_>, _call: &CallArgs) -> Result<(), BoxError> {
        ctx.get_or_compute(&mut self.child, &CallArgs::new())?;
        Ok(())
    }
}

/// Task with a field that has no canonical form
pub struct Opaque {
    pub lookup: BTreeMap<(u8, u8), u8>,
    pub state: TaskState,
}

impl TaskNode for Opaque {
    fn task_name(&self) -> &str {
        "Opaque"
    }
    fn definition(&self) -> &str {
        "1"
    }
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::plain("lookup", &self.lookup)]
    }
    fn state(&self) -> &TaskState {
        &self.state
    }
}

impl CachableTask for Opaque {
    type Output = u8;

    fn run(&mut self, _ctx: &mut TaskContext<'_>, _call: &CallArgs) -> Result<u8, BoxError> {
        Ok(0)
    }
}

/// Parent embedding an [`Opaque`] sub-task
pub struct Wrapper {
    pub inner: Opaque,
    pub state: TaskState,
}

impl TaskNode for Wrapper {
    fn task_name(&self) -> &str {
        "Wrapper"
    }
    fn definition(&self) -> &str {
        "1"
    }
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::subtask("inner", &self.inner)]
    }
    fn state(&self) -> &TaskState {
        &self.state
    }
}

impl CachableTask for Wrapper {
    type Output = u8;

    fn run(&mut self, _ctx: &mut TaskContext<'_>, _call: &CallArgs) -> Result<u8, BoxError> {
        Ok(1)
    }
}

/// Leaf task with a caller-chosen type name
pub struct Named {
    pub name: &'static str,
    pub value: i64,
    pub runs: Runs,
    pub state: TaskState,
}

impl Named {
    pub fn new(name: &'static str, value: i64, runs: &Runs) -> Self {
        Self {
            name,
            value,
            runs: Rc::clone(runs),
            state: TaskState::new(),
        }
    }
}

impl TaskNode for Named {
    fn task_name(&self) -> &str {
        self.name
    }
    fn definition(&self) -> &str {
        "1"
    }
    fn fields(&self) -> Vec<Field<'_>> {
        vec![Field::plain("value", &self.value), Field::tool("runs")]
    }
    fn state(&self) -> &TaskState {
        &self.state
    }
}

impl CachableTask for Named {
    type Output = i64;

    fn run(&mut self, _ctx: &mut TaskContext<'_>, _call: &CallArgs) -> Result<i64, BoxError> {
        self.runs.set(self.runs.get() + 1);
        Ok(self.value)
    }
}
