//! Recording test doubles for the backend's collaborators.
//!
//! Each fake counts its calls, records their arguments and returns
//! whatever the test programmed.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use garden_backend::error::{KillError, NetworkError, RuntimeError, UserNamespaceError};
use garden_backend::killer::{KillBehavior, Killer};
use garden_backend::network::Network;
use garden_backend::oci::OciSpec;
use garden_backend::runtime::{
    ExitStatus, Labels, RuntimeClient, RuntimeContainer, Signal, Task,
};
use garden_backend::userns::UserNamespace;
use garden_backend::{Backend, BackendConfig};

/// A programmed runtime failure.
#[derive(Debug, Clone)]
pub enum Failure {
    Message(&'static str),
    NotFound,
}

impl Failure {
    fn to_error(&self, id: &str) -> RuntimeError {
        match self {
            Failure::Message(msg) => RuntimeError::Other(msg.to_string()),
            Failure::NotFound => RuntimeError::task_not_found(id),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().expect("lock poisoned")
}

#[derive(Default)]
pub struct FakeTask {
    id: String,
    start_error: Mutex<Option<Failure>>,
    delete_error: Mutex<Option<Failure>>,
    start_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FakeTask {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            ..Default::default()
        })
    }

    pub fn fail_start(&self, failure: Failure) {
        *lock(&self.start_error) = Some(failure);
    }

    pub fn fail_delete(&self, failure: Failure) {
        *lock(&self.delete_error) = Some(failure);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for FakeTask {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.start_error).as_ref() {
            Some(f) => Err(f.to_error(&self.id)),
            None => Ok(()),
        }
    }

    async fn kill(&self, _signal: Signal) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn wait(&self) -> Result<ExitStatus, RuntimeError> {
        Ok(ExitStatus { code: 0 })
    }

    async fn delete(&self) -> Result<ExitStatus, RuntimeError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.delete_error).as_ref() {
            Some(f) => Err(f.to_error(&self.id)),
            None => Ok(ExitStatus { code: 0 }),
        }
    }
}

#[derive(Default)]
pub struct FakeContainer {
    id: String,
    labels: Mutex<Labels>,
    labels_error: Mutex<Option<Failure>>,
    set_labels_error: Mutex<Option<Failure>>,
    new_task: Mutex<Option<Arc<FakeTask>>>,
    new_task_error: Mutex<Option<Failure>>,
    task: Mutex<Option<Arc<FakeTask>>>,
    task_error: Mutex<Option<Failure>>,
    delete_error: Mutex<Option<Failure>>,
    new_task_calls: AtomicUsize,
    task_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    set_labels_calls: AtomicUsize,
}

impl FakeContainer {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            ..Default::default()
        })
    }

    pub fn set_labels_value(&self, labels: Labels) {
        *lock(&self.labels) = labels;
    }

    pub fn stored_labels(&self) -> Labels {
        lock(&self.labels).clone()
    }

    pub fn fail_labels(&self, failure: Failure) {
        *lock(&self.labels_error) = Some(failure);
    }

    pub fn fail_set_labels(&self, failure: Failure) {
        *lock(&self.set_labels_error) = Some(failure);
    }

    pub fn returns_new_task(&self, task: Arc<FakeTask>) {
        *lock(&self.new_task) = Some(task);
    }

    pub fn fail_new_task(&self, failure: Failure) {
        *lock(&self.new_task_error) = Some(failure);
    }

    /// Makes `task()` return this task. Without one, `task()` is not-found.
    pub fn returns_task(&self, task: Arc<FakeTask>) {
        *lock(&self.task) = Some(task);
    }

    pub fn fail_task(&self, failure: Failure) {
        *lock(&self.task_error) = Some(failure);
    }

    pub fn fail_delete(&self, failure: Failure) {
        *lock(&self.delete_error) = Some(failure);
    }

    pub fn new_task_calls(&self) -> usize {
        self.new_task_calls.load(Ordering::SeqCst)
    }

    pub fn task_calls(&self) -> usize {
        self.task_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn set_labels_calls(&self) -> usize {
        self.set_labels_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeContainer for FakeContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn labels(&self) -> Result<Labels, RuntimeError> {
        if let Some(f) = lock(&self.labels_error).as_ref() {
            return Err(f.to_error(&self.id));
        }
        Ok(lock(&self.labels).clone())
    }

    async fn set_labels(&self, labels: Labels) -> Result<Labels, RuntimeError> {
        self.set_labels_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = lock(&self.set_labels_error).as_ref() {
            return Err(f.to_error(&self.id));
        }
        *lock(&self.labels) = labels.clone();
        Ok(labels)
    }

    async fn new_task(&self) -> Result<Arc<dyn Task>, RuntimeError> {
        self.new_task_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = lock(&self.new_task_error).as_ref() {
            return Err(f.to_error(&self.id));
        }
        let task = lock(&self.new_task)
            .clone()
            .unwrap_or_else(|| FakeTask::new(&self.id));
        Ok(task)
    }

    async fn task(&self) -> Result<Arc<dyn Task>, RuntimeError> {
        self.task_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = lock(&self.task_error).as_ref() {
            return Err(f.to_error(&self.id));
        }
        match lock(&self.task).clone() {
            Some(task) => Ok(task),
            None => Err(RuntimeError::task_not_found(&self.id)),
        }
    }

    async fn delete(&self) -> Result<(), RuntimeError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.delete_error).as_ref() {
            Some(f) => Err(f.to_error(&self.id)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeClient {
    init_error: Mutex<Option<Failure>>,
    stop_error: Mutex<Option<Failure>>,
    version_error: Mutex<Option<Failure>>,
    new_container: Mutex<Option<Arc<FakeContainer>>>,
    new_container_error: Mutex<Option<Failure>>,
    get_container: Mutex<Option<Arc<FakeContainer>>>,
    get_container_error: Mutex<Option<Failure>>,
    containers: Mutex<Vec<Arc<FakeContainer>>>,
    containers_error: Mutex<Option<Failure>>,

    init_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    version_calls: AtomicUsize,
    new_container_args: Mutex<Vec<(String, Labels, OciSpec)>>,
    get_container_args: Mutex<Vec<String>>,
    containers_args: Mutex<Vec<Vec<String>>>,
}

impl FakeClient {
    pub fn fail_init(&self, failure: Failure) {
        *lock(&self.init_error) = Some(failure);
    }

    pub fn fail_stop(&self, failure: Failure) {
        *lock(&self.stop_error) = Some(failure);
    }

    pub fn fail_version(&self, failure: Failure) {
        *lock(&self.version_error) = Some(failure);
    }

    pub fn returns_new_container(&self, container: Arc<FakeContainer>) {
        *lock(&self.new_container) = Some(container);
    }

    pub fn fail_new_container(&self, failure: Failure) {
        *lock(&self.new_container_error) = Some(failure);
    }

    pub fn returns_container(&self, container: Arc<FakeContainer>) {
        *lock(&self.get_container) = Some(container);
    }

    pub fn fail_get_container(&self, failure: Failure) {
        *lock(&self.get_container_error) = Some(failure);
    }

    pub fn returns_containers(&self, containers: Vec<Arc<FakeContainer>>) {
        *lock(&self.containers) = containers;
    }

    pub fn fail_containers(&self, failure: Failure) {
        *lock(&self.containers_error) = Some(failure);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn new_container_calls(&self) -> usize {
        lock(&self.new_container_args).len()
    }

    pub fn new_container_args(&self, call: usize) -> (String, Labels, OciSpec) {
        lock(&self.new_container_args)[call].clone()
    }

    pub fn get_container_calls(&self) -> usize {
        lock(&self.get_container_args).len()
    }

    pub fn get_container_args(&self, call: usize) -> String {
        lock(&self.get_container_args)[call].clone()
    }

    pub fn containers_calls(&self) -> usize {
        lock(&self.containers_args).len()
    }

    pub fn containers_args(&self, call: usize) -> Vec<String> {
        lock(&self.containers_args)[call].clone()
    }
}

#[async_trait]
impl RuntimeClient for FakeClient {
    async fn init(&self) -> Result<(), RuntimeError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.init_error).as_ref() {
            Some(f) => Err(f.to_error("runtime")),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.stop_error).as_ref() {
            Some(f) => Err(f.to_error("runtime")),
            None => Ok(()),
        }
    }

    async fn version(&self) -> Result<String, RuntimeError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.version_error).as_ref() {
            Some(f) => Err(f.to_error("runtime")),
            None => Ok("1.0.0".to_string()),
        }
    }

    async fn new_container(
        &self,
        handle: &str,
        labels: &Labels,
        oci: &OciSpec,
    ) -> Result<Arc<dyn RuntimeContainer>, RuntimeError> {
        lock(&self.new_container_args).push((handle.to_string(), labels.clone(), oci.clone()));
        if let Some(f) = lock(&self.new_container_error).as_ref() {
            return Err(f.to_error(handle));
        }
        let container = lock(&self.new_container)
            .clone()
            .unwrap_or_else(|| FakeContainer::new(handle));
        Ok(container)
    }

    async fn get_container(&self, handle: &str) -> Result<Arc<dyn RuntimeContainer>, RuntimeError> {
        lock(&self.get_container_args).push(handle.to_string());
        if let Some(f) = lock(&self.get_container_error).as_ref() {
            return Err(match f {
                Failure::NotFound => RuntimeError::container_not_found(handle),
                other => other.to_error(handle),
            });
        }
        let container = lock(&self.get_container)
            .clone()
            .unwrap_or_else(|| FakeContainer::new(handle));
        Ok(container)
    }

    async fn containers(
        &self,
        selectors: &[String],
    ) -> Result<Vec<Arc<dyn RuntimeContainer>>, RuntimeError> {
        lock(&self.containers_args).push(selectors.to_vec());
        if let Some(f) = lock(&self.containers_error).as_ref() {
            return Err(f.to_error("containers"));
        }
        Ok(lock(&self.containers)
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn RuntimeContainer>)
            .collect())
    }
}

/// Failure reported by a fake killer or network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CollaboratorError(pub &'static str);

#[derive(Default)]
pub struct FakeKiller {
    kill_error: Mutex<Option<&'static str>>,
    kill_args: Mutex<Vec<(String, KillBehavior)>>,
}

impl FakeKiller {
    pub fn fail_kill(&self, msg: &'static str) {
        *lock(&self.kill_error) = Some(msg);
    }

    pub fn kill_calls(&self) -> usize {
        lock(&self.kill_args).len()
    }

    pub fn kill_args(&self, call: usize) -> (String, KillBehavior) {
        lock(&self.kill_args)[call].clone()
    }
}

#[async_trait]
impl Killer for FakeKiller {
    async fn kill(&self, task: &dyn Task, behavior: KillBehavior) -> Result<(), KillError> {
        lock(&self.kill_args).push((task.id().to_string(), behavior));
        match *lock(&self.kill_error) {
            Some(msg) => Err(KillError::Other(Box::new(CollaboratorError(msg)))),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeNetwork {
    remove_error: Mutex<Option<&'static str>>,
    remove_args: Mutex<Vec<(String, String)>>,
}

impl FakeNetwork {
    pub fn fail_remove(&self, msg: &'static str) {
        *lock(&self.remove_error) = Some(msg);
    }

    pub fn remove_calls(&self) -> usize {
        lock(&self.remove_args).len()
    }

    pub fn remove_args(&self, call: usize) -> (String, String) {
        lock(&self.remove_args)[call].clone()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn remove(&self, namespace: &str, handle: &str) -> Result<(), NetworkError> {
        lock(&self.remove_args).push((namespace.to_string(), handle.to_string()));
        match *lock(&self.remove_error) {
            Some(msg) => Err(NetworkError::Remove {
                handle: handle.to_string(),
                source: Box::new(CollaboratorError(msg)),
            }),
            None => Ok(()),
        }
    }
}

pub struct FakeUserNamespace {
    ids: Mutex<Result<(u32, u32), &'static str>>,
    calls: AtomicUsize,
}

impl Default for FakeUserNamespace {
    fn default() -> Self {
        Self {
            ids: Mutex::new(Ok((65535, 65535))),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeUserNamespace {
    pub fn returns(&self, uid: u32, gid: u32) {
        *lock(&self.ids) = Ok((uid, gid));
    }

    pub fn fail(&self, msg: &'static str) {
        *lock(&self.ids) = Err(msg);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserNamespace for FakeUserNamespace {
    async fn max_valid_ids(&self) -> Result<(u32, u32), UserNamespaceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *lock(&self.ids) {
            Ok(ids) => Ok(ids),
            Err(msg) => Err(UserNamespaceError::EmptyMap(msg.to_string())),
        }
    }
}

/// A backend wired to fresh fakes.
pub struct Suite {
    pub backend: Backend,
    pub client: Arc<FakeClient>,
    pub network: Arc<FakeNetwork>,
    pub userns: Arc<FakeUserNamespace>,
    pub killer: Arc<FakeKiller>,
}

pub fn setup() -> Suite {
    let client = Arc::new(FakeClient::default());
    let network = Arc::new(FakeNetwork::default());
    let userns = Arc::new(FakeUserNamespace::default());
    let killer = Arc::new(FakeKiller::default());

    let backend = Backend::new(
        BackendConfig::new()
            .with_runtime(client.clone())
            .with_network(network.clone())
            .with_user_namespace(userns.clone())
            .with_killer(killer.clone()),
    )
    .expect("backend with runtime");

    Suite {
        backend,
        client,
        network,
        userns,
        killer,
    }
}
