//! ---
//! prov_section: "11-simulation"
//! prov_subsection: "01-bootstrap"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Recording adapter backend with failure injection."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
//! [`RecordingBackend`] implements every adapter capability in memory. It
//! keeps an ordered log of calls and can be told to fail any call kind, which
//! is how failure scenarios are staged in tests and in simulation mode.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use prov_common::model::ExecutionJob;
use prov_core::{
    AdapterError, AdapterResult, Adapters, Blueprint, BuildRequest, BuildTrigger, ComponentSpec,
    IssueTracker, LinkedServer, PermissionScheme, PermissionSchemeSpec, RepoHostProject,
    RepoHostProjectSpec, Repository, RepositorySpec, SourceRepoHost, TrackerComponent,
    TrackerProject, TrackerProjectSpec, Wiki, WikiSpace, WikiSpaceSpec,
};
use tracing::debug;

/// Blueprint key offered by default; matches the provisioning default.
pub const DEFAULT_BLUEPRINT_KEY: &str =
    "com.atlassian.confluence.plugins.confluence-space-blueprints:documentation-space-blueprint";

/// Calls kept by [`RecordingBackend::for_simulation`]; older calls are dropped.
pub const SIMULATION_CALL_LOG_LIMIT: usize = 1024;

/// One adapter call as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateTrackerProject(String),
    DeleteTrackerProject(String),
    GetOrCreatePermissionScheme(String),
    DeletePermissionScheme(String),
    CreateComponent { project_key: String, name: String },
    DeleteComponent(String),
    ListBlueprints,
    ListLinkedTrackerServers,
    CreateSpace(String),
    DeleteSpace(String),
    CreateRepoHostProject(String),
    DeleteRepoHostProject(String),
    CreateRepository { project_key: String, name: String },
    DeleteRepository { project_key: String, name: String },
    Trigger(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreateTrackerProject,
    DeleteTrackerProject,
    GetOrCreatePermissionScheme,
    DeletePermissionScheme,
    CreateComponent,
    DeleteComponent,
    ListBlueprints,
    ListLinkedTrackerServers,
    CreateSpace,
    DeleteSpace,
    CreateRepoHostProject,
    DeleteRepoHostProject,
    CreateRepository,
    DeleteRepository,
    Trigger,
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::CreateTrackerProject(_) => CallKind::CreateTrackerProject,
            Call::DeleteTrackerProject(_) => CallKind::DeleteTrackerProject,
            Call::GetOrCreatePermissionScheme(_) => CallKind::GetOrCreatePermissionScheme,
            Call::DeletePermissionScheme(_) => CallKind::DeletePermissionScheme,
            Call::CreateComponent { .. } => CallKind::CreateComponent,
            Call::DeleteComponent(_) => CallKind::DeleteComponent,
            Call::ListBlueprints => CallKind::ListBlueprints,
            Call::ListLinkedTrackerServers => CallKind::ListLinkedTrackerServers,
            Call::CreateSpace(_) => CallKind::CreateSpace,
            Call::DeleteSpace(_) => CallKind::DeleteSpace,
            Call::CreateRepoHostProject(_) => CallKind::CreateRepoHostProject,
            Call::DeleteRepoHostProject(_) => CallKind::DeleteRepoHostProject,
            Call::CreateRepository { .. } => CallKind::CreateRepository,
            Call::DeleteRepository { .. } => CallKind::DeleteRepository,
            Call::Trigger(_) => CallKind::Trigger,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self.kind(),
            CallKind::DeleteTrackerProject
                | CallKind::DeletePermissionScheme
                | CallKind::DeleteComponent
                | CallKind::DeleteSpace
                | CallKind::DeleteRepoHostProject
                | CallKind::DeleteRepository
        )
    }
}

#[derive(Debug, Default)]
struct State {
    calls: VecDeque<Call>,
    call_limit: Option<usize>,
    failures: HashMap<CallKind, AdapterError>,
    /// Calls of a failing kind still allowed to succeed first.
    grace: HashMap<CallKind, usize>,
    /// Resources currently alive, as `kind:handle`.
    live: BTreeSet<String>,
    next_id: u64,
    build_number: u64,
}

/// In-memory implementation of every adapter capability.
#[derive(Debug)]
pub struct RecordingBackend {
    state: Mutex<State>,
    base_url: String,
    blueprints: Vec<Blueprint>,
    linked_servers: Vec<LinkedServer>,
    reuse_permission_scheme: bool,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            base_url: "https://sim.invalid".to_owned(),
            blueprints: vec![Blueprint {
                key: DEFAULT_BLUEPRINT_KEY.to_owned(),
                name: "Documentation space".to_owned(),
            }],
            linked_servers: vec![LinkedServer {
                id: "tracker-1".to_owned(),
                name: "Issue tracker".to_owned(),
            }],
            reuse_permission_scheme: false,
        }
    }
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend for long-running simulation: the call log keeps only the most
    /// recent [`SIMULATION_CALL_LOG_LIMIT`] calls.
    pub fn for_simulation() -> Arc<Self> {
        let backend = Self::default();
        backend.state.lock().call_limit = Some(SIMULATION_CALL_LOG_LIMIT);
        Arc::new(backend)
    }

    /// Backend whose permission-scheme lookup finds an existing scheme.
    pub fn with_existing_permission_scheme() -> Arc<Self> {
        Arc::new(Self {
            reuse_permission_scheme: true,
            ..Self::default()
        })
    }

    /// Backend offering the given blueprints instead of the default one.
    pub fn with_blueprints(blueprints: Vec<Blueprint>) -> Arc<Self> {
        Arc::new(Self {
            blueprints,
            ..Self::default()
        })
    }

    /// Adapter bundle backed entirely by this instance.
    pub fn adapters(self: &Arc<Self>) -> Adapters {
        Adapters::from_backend(self.clone())
    }

    /// Make every subsequent call of `kind` fail with `error`.
    pub fn fail_on(&self, kind: CallKind, error: AdapterError) {
        self.fail_after(kind, 0, error);
    }

    /// Let the next `successes` calls of `kind` through, then fail the rest.
    pub fn fail_after(&self, kind: CallKind, successes: usize, error: AdapterError) {
        let mut state = self.state.lock();
        state.failures.insert(kind, error);
        state.grace.insert(kind, successes);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failures.clear();
        state.grace.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.iter().cloned().collect()
    }

    /// Delete calls in the order they were issued.
    pub fn deletes(&self) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.is_delete())
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Resources created and not yet deleted, as `kind:handle`.
    pub fn live_resources(&self) -> Vec<String> {
        self.state.lock().live.iter().cloned().collect()
    }

    fn enter(&self, call: Call) -> AdapterResult<()> {
        let mut state = self.state.lock();
        debug!(?call, "adapter call");
        let kind = call.kind();
        let mut failure = state.failures.get(&kind).cloned();
        if let Some(grace) = state.grace.get_mut(&kind).filter(|grace| **grace > 0) {
            *grace -= 1;
            failure = None;
        }
        state.calls.push_back(call);
        if let Some(limit) = state.call_limit {
            while state.calls.len() > limit {
                state.calls.pop_front();
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn create(&self, resource: String) -> AdapterResult<()> {
        let mut state = self.state.lock();
        if !state.live.insert(resource.clone()) {
            return Err(AdapterError::Rejected(format!("{resource} already exists")));
        }
        Ok(())
    }

    fn remove(&self, resource: &str) {
        self.state.lock().live.remove(resource);
    }

    fn remove_prefix(&self, prefix: &str) {
        self.state.lock().live.retain(|resource| !resource.starts_with(prefix));
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        10_000 + state.next_id
    }
}

#[async_trait]
impl IssueTracker for RecordingBackend {
    async fn create_project(&self, spec: &TrackerProjectSpec) -> AdapterResult<TrackerProject> {
        self.enter(Call::CreateTrackerProject(spec.key.clone()))?;
        self.create(format!("tracker-project:{}", spec.key))?;
        Ok(TrackerProject {
            key: spec.key.clone(),
            id: self.next_id().to_string(),
            url: Some(format!("{}/tracker/browse/{}", self.base_url, spec.key)),
        })
    }

    async fn delete_project(&self, project_key: &str) -> AdapterResult<()> {
        self.enter(Call::DeleteTrackerProject(project_key.to_owned()))?;
        self.remove(&format!("tracker-project:{project_key}"));
        self.remove_prefix(&format!("tracker-component:{project_key}/"));
        Ok(())
    }

    async fn get_or_create_permission_scheme(
        &self,
        spec: &PermissionSchemeSpec,
    ) -> AdapterResult<PermissionScheme> {
        self.enter(Call::GetOrCreatePermissionScheme(spec.project_key.clone()))?;
        if self.reuse_permission_scheme {
            return Ok(PermissionScheme {
                id: "10000".to_owned(),
                created: false,
            });
        }
        let id = self.next_id().to_string();
        self.create(format!("permission-scheme:{id}"))?;
        Ok(PermissionScheme { id, created: true })
    }

    async fn delete_permission_scheme(&self, scheme_id: &str) -> AdapterResult<()> {
        self.enter(Call::DeletePermissionScheme(scheme_id.to_owned()))?;
        self.remove(&format!("permission-scheme:{scheme_id}"));
        Ok(())
    }

    async fn create_component(&self, spec: &ComponentSpec) -> AdapterResult<TrackerComponent> {
        self.enter(Call::CreateComponent {
            project_key: spec.project_key.clone(),
            name: spec.name.clone(),
        })?;
        let id = self.next_id().to_string();
        self.create(format!("tracker-component:{}/{id}", spec.project_key))?;
        Ok(TrackerComponent {
            id,
            name: spec.name.clone(),
        })
    }

    async fn delete_component(&self, component_id: &str) -> AdapterResult<()> {
        self.enter(Call::DeleteComponent(component_id.to_owned()))?;
        let suffix = format!("/{component_id}");
        self.state.lock().live.retain(|resource| {
            !(resource.starts_with("tracker-component:") && resource.ends_with(&suffix))
        });
        Ok(())
    }
}

#[async_trait]
impl Wiki for RecordingBackend {
    async fn list_blueprints(&self) -> AdapterResult<Vec<Blueprint>> {
        self.enter(Call::ListBlueprints)?;
        Ok(self.blueprints.clone())
    }

    async fn list_linked_tracker_servers(&self) -> AdapterResult<Vec<LinkedServer>> {
        self.enter(Call::ListLinkedTrackerServers)?;
        Ok(self.linked_servers.clone())
    }

    async fn create_space(&self, spec: &WikiSpaceSpec) -> AdapterResult<WikiSpace> {
        self.enter(Call::CreateSpace(spec.key.clone()))?;
        self.create(format!("wiki-space:{}", spec.key))?;
        Ok(WikiSpace {
            key: spec.key.clone(),
            url: Some(format!("{}/wiki/display/{}", self.base_url, spec.key)),
        })
    }

    async fn delete_space(&self, space_key: &str) -> AdapterResult<()> {
        self.enter(Call::DeleteSpace(space_key.to_owned()))?;
        self.remove(&format!("wiki-space:{space_key}"));
        Ok(())
    }
}

#[async_trait]
impl SourceRepoHost for RecordingBackend {
    async fn create_project(&self, spec: &RepoHostProjectSpec) -> AdapterResult<RepoHostProject> {
        self.enter(Call::CreateRepoHostProject(spec.key.clone()))?;
        self.create(format!("repo-project:{}", spec.key))?;
        Ok(RepoHostProject {
            key: spec.key.clone(),
            url: Some(format!("{}/scm/projects/{}", self.base_url, spec.key)),
        })
    }

    async fn delete_project(&self, project_key: &str) -> AdapterResult<()> {
        self.enter(Call::DeleteRepoHostProject(project_key.to_owned()))?;
        self.remove(&format!("repo-project:{project_key}"));
        self.remove_prefix(&format!("repository:{project_key}/"));
        Ok(())
    }

    async fn create_repository(&self, spec: &RepositorySpec) -> AdapterResult<Repository> {
        self.enter(Call::CreateRepository {
            project_key: spec.project_key.clone(),
            name: spec.name.clone(),
        })?;
        self.create(format!("repository:{}/{}", spec.project_key, spec.name))?;
        Ok(Repository {
            name: spec.name.clone(),
            url: Some(format!(
                "{}/scm/{}/{}.git",
                self.base_url,
                spec.project_key.to_lowercase(),
                spec.name
            )),
        })
    }

    async fn delete_repository(&self, project_key: &str, name: &str) -> AdapterResult<()> {
        self.enter(Call::DeleteRepository {
            project_key: project_key.to_owned(),
            name: name.to_owned(),
        })?;
        self.remove(&format!("repository:{project_key}/{name}"));
        Ok(())
    }
}

#[async_trait]
impl BuildTrigger for RecordingBackend {
    async fn trigger(&self, job_path: &str, _request: &BuildRequest) -> AdapterResult<ExecutionJob> {
        self.enter(Call::Trigger(job_path.to_owned()))?;
        let name = job_path
            .split('&')
            .find_map(|param| param.strip_prefix("component="))
            .unwrap_or(job_path)
            .to_owned();
        let build_number = {
            let mut state = self.state.lock();
            state.build_number += 1;
            state.build_number
        };
        Ok(ExecutionJob {
            url: format!("{}/jenkins/job/{name}/{build_number}", self.base_url),
            name,
            build_number: Some(build_number),
        })
    }
}
