//! # Plan loader (component C9)
//!
//! ## Para todos entenderem:
//!
//! O documento de plano é só um JSON: uma lista de instâncias do cluster e
//! uma lista de ações com seus `depends: [índices]`. Este módulo faz a
//! ponte entre esse JSON e o `ChaosPlan` de verdade (C8): lê o arquivo,
//! valida (sem ciclos, sem ação desconhecida, sem índice fora do intervalo),
//! constrói cada ação concreta a partir do seu payload específico, resolve
//! os índices de `depends` em arestas do DAG, e entrega tudo pronto para
//! `ChaosPlan::new`.
//!
//! Grounded in the teacher's `loader::load_plan_from_file` +
//! `protocol::Plan` deserialization, generalized from the HTTP-step shape
//! to the chaos-action shape; cycle detection is grounded in the teacher's
//! `validation::validate_dag` three-color DFS.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::action::control_flow::{AssignAction, CheckProcAction, EmptyAction, ExecutionExpressionAction, SendEmailAction, WaitAction};
use crate::action::loop_action::LoopAction;
use crate::action::{ActionBehavior, ActionNode};
use crate::actions::disturb_actions::{FillDiskAction, RandomPartitionAction, RandomRestartAction, RandomTrafficControlAction, SlowDiskAction, TruncateWalAction};
use crate::actions::lifecycle::{CleanCheckpointAction, CleanDataAction, CleanWalAction, CrashAction, RestoreFromCheckpointAction, RestoreFromDataDirAction, StartAction, StopAction};
use crate::actions::meta::{
    BalanceDataAction, BalanceLeaderAction, CheckLeadersAction, CompactionAction, CreateCheckpointAction, CreateSchemaAction, CreateSpaceAction,
    DescSpaceAction, MetaActionAdapter, UpdateConfigsAction, UseSpaceAction,
};
use crate::actions::query::{ClientConnectAction, WalkThroughAction, WriteCircleAction};
use crate::action::disturb::DisturbActionAdapter;
use crate::client::console::console_client;
use crate::client::GraphClient;
use crate::plan::ChaosPlan;
use crate::remote::target::{RemoteTarget, Role};
use crate::remote::{RemoteExec, SshExec};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan has no actions")]
    EmptyPlan,
    #[error("action {index}: unknown kind '{kind}'")]
    UnknownActionKind { index: usize, kind: String },
    #[error("action {index} ({kind}): invalid params: {source}")]
    InvalidActionParams { index: usize, kind: String, source: String },
    #[error("action {index}: depends on out-of-range or forward/self index {depends_on}")]
    UnresolvedDependency { index: usize, depends_on: usize },
    #[error("action {index}: participates in a dependency cycle")]
    CircularDependency { index: usize },
    #[error("action {index} ({kind}): unknown instance '{name}'")]
    UnknownInstance { index: usize, kind: String, name: String },
    #[error("instance '{name}': unknown type '{kind}', expected storaged|metad|graphd")]
    UnknownInstanceType { name: String, kind: String },
}

fn default_concurrency() -> usize {
    crate::plan::DEFAULT_CONCURRENCY
}

#[derive(Debug, Deserialize)]
pub struct PlanDocument {
    pub name: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub rolling_table: bool,
    pub instances: Vec<InstanceDecl>,
    pub actions: Vec<ActionDecl>,
}

#[derive(Debug, Deserialize)]
pub struct InstanceDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub install_dir: String,
    pub conf_dir: String,
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionDecl {
    pub kind: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub depends: Vec<usize>,
}

/// Reads the plan document from disk and builds a ready-to-run
/// [`ChaosPlan`]. File and JSON-parse errors are wrapped with
/// `anyhow::Context` so the failure names the offending path.
pub fn load_plan_from_file<P: AsRef<Path>>(path: P) -> Result<ChaosPlan> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read plan file {}", path.display()))?;
    let doc: PlanDocument = serde_json::from_str(&content).with_context(|| format!("failed to parse plan JSON in {}", path.display()))?;
    build_plan(doc).map_err(anyhow::Error::from)
}

#[derive(Debug, Deserialize)]
struct InstanceFile {
    instances: Vec<InstanceDecl>,
}

#[derive(Debug, Deserialize)]
struct ActionFile {
    name: String,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
    #[serde(default)]
    email: Option<String>,
    #[serde(default = "default_rolling_table")]
    rolling_table: bool,
    actions: Vec<ActionDecl>,
}

fn default_rolling_table() -> bool {
    true
}

/// Reads the instance conf file and the action conf file separately and
/// merges them into one [`PlanDocument`] (the CLI's `--instance_conf_file`
/// / `--action_conf_file` split).
pub fn load_plan_from_files<P: AsRef<Path>>(instance_path: P, action_path: P) -> Result<ChaosPlan> {
    let instance_path = instance_path.as_ref();
    let action_path = action_path.as_ref();

    let instance_content = std::fs::read_to_string(instance_path)
        .with_context(|| format!("failed to read instance conf file {}", instance_path.display()))?;
    let instance_file: InstanceFile = serde_json::from_str(&instance_content)
        .with_context(|| format!("failed to parse instance conf JSON in {}", instance_path.display()))?;

    let action_content = std::fs::read_to_string(action_path)
        .with_context(|| format!("failed to read action conf file {}", action_path.display()))?;
    let action_file: ActionFile = serde_json::from_str(&action_content)
        .with_context(|| format!("failed to parse action conf JSON in {}", action_path.display()))?;

    let doc = PlanDocument {
        name: action_file.name,
        concurrency: action_file.concurrency,
        email: action_file.email,
        rolling_table: action_file.rolling_table,
        instances: instance_file.instances,
        actions: action_file.actions,
    };
    build_plan(doc).map_err(anyhow::Error::from)
}

fn build_instances(decls: &[InstanceDecl]) -> Result<HashMap<String, Arc<RemoteTarget>>, PlanError> {
    let mut instances = HashMap::with_capacity(decls.len());
    for decl in decls {
        let role = match decl.kind.as_str() {
            "storaged" => Role::Storage,
            "metad" => Role::Meta,
            "graphd" => Role::Graph,
            other => return Err(PlanError::UnknownInstanceType { name: decl.name.clone(), kind: other.to_string() }),
        };
        let target = Arc::new(RemoteTarget::new(decl.host.clone(), decl.install_dir.clone(), decl.conf_dir.clone(), role, decl.user.clone()));
        instances.insert(decl.name.clone(), target);
    }
    Ok(instances)
}

fn resolve_instance(instances: &HashMap<String, Arc<RemoteTarget>>, index: usize, kind: &str, name: &str) -> Result<Arc<RemoteTarget>, PlanError> {
    instances
        .get(name)
        .cloned()
        .ok_or_else(|| PlanError::UnknownInstance { index, kind: kind.to_string(), name: name.to_string() })
}

fn resolve_instances(instances: &HashMap<String, Arc<RemoteTarget>>, index: usize, kind: &str, names: &[String]) -> Result<Vec<Arc<RemoteTarget>>, PlanError> {
    names.iter().map(|n| resolve_instance(instances, index, kind, n)).collect()
}

fn params_of<T: serde::de::DeserializeOwned>(decl: &ActionDecl, index: usize) -> Result<T, PlanError> {
    serde_json::from_value(decl.params.clone()).map_err(|e| PlanError::InvalidActionParams { index, kind: decl.kind.clone(), source: e.to_string() })
}

pub fn build_plan(doc: PlanDocument) -> Result<ChaosPlan, PlanError> {
    if doc.actions.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    let instances = build_instances(&doc.instances)?;
    let remote: Arc<dyn RemoteExec> = Arc::new(SshExec);
    let graph_address = doc
        .instances
        .iter()
        .find(|i| i.kind == "graphd")
        .map(|i| i.host.clone())
        .unwrap_or_else(|| "127.0.0.1:3699".to_string());
    let client: Arc<dyn GraphClient> = console_client(graph_address);

    let nodes = build_action_list(&doc.actions, &instances, &client, &remote)?;

    let sink = Box::new(EmptyAction::new("SINK"));
    Ok(ChaosPlan::new(nodes, sink, doc.name, doc.email, doc.concurrency))
}

/// Builds a dense, internally-wired `Vec<ActionNode>` from a flat action
/// list -- used both for the top-level plan and recursively for a loop
/// action's sub-plan, each with its own dense `0..len()` id space.
fn build_action_list(
    decls: &[ActionDecl],
    instances: &HashMap<String, Arc<RemoteTarget>>,
    client: &Arc<dyn GraphClient>,
    remote: &Arc<dyn RemoteExec>,
) -> Result<Vec<ActionNode>, PlanError> {
    for (index, decl) in decls.iter().enumerate() {
        for &dep in &decl.depends {
            if dep >= index {
                return Err(PlanError::UnresolvedDependency { index, depends_on: dep });
            }
        }
    }
    detect_cycles(decls)?;

    let mut nodes = Vec::with_capacity(decls.len());
    for (index, decl) in decls.iter().enumerate() {
        let behavior = build_behavior(decl, index, instances, client, remote)?;
        let mut node = ActionNode::new(index as u32, behavior);
        node.dependees = decl.depends.iter().map(|&d| d as u32).collect();
        nodes.push(node);
    }
    for i in 0..nodes.len() {
        let dependees = nodes[i].dependees.clone();
        let id = nodes[i].id;
        for dependee in dependees {
            nodes[dependee as usize].dependers.push(id);
        }
    }
    Ok(nodes)
}

/// Three-color DFS over the `depends` graph. Dead code path in practice --
/// `build_action_list`'s forward/self-reference check already makes a
/// cycle impossible -- kept as the independent validation pass SPEC_FULL.md
/// §4.4 requires of the loader, in case that invariant is ever relaxed.
fn detect_cycles(decls: &[ActionDecl]) -> Result<(), PlanError> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    fn visit(node: usize, decls: &[ActionDecl], color: &mut [u8]) -> Result<(), PlanError> {
        color[node] = GRAY;
        for &dep in &decls[node].depends {
            match color[dep] {
                GRAY => return Err(PlanError::CircularDependency { index: node }),
                WHITE => visit(dep, decls, color)?,
                _ => {}
            }
        }
        color[node] = BLACK;
        Ok(())
    }

    let mut color = vec![WHITE; decls.len()];
    for i in 0..decls.len() {
        if color[i] == WHITE {
            visit(i, decls, &mut color)?;
        }
    }
    Ok(())
}

fn build_behavior(
    decl: &ActionDecl,
    index: usize,
    instances: &HashMap<String, Arc<RemoteTarget>>,
    client: &Arc<dyn GraphClient>,
    remote: &Arc<dyn RemoteExec>,
) -> Result<Box<dyn ActionBehavior>, PlanError> {
    match decl.kind.as_str() {
        "empty" => Ok(Box::new(EmptyAction::new(format!("action-{index}")))),
        "wait" => {
            let p: WaitParams = params_of(decl, index)?;
            WaitAction::new(p.wait_time_ms)
                .map(|a| Box::new(a) as Box<dyn ActionBehavior>)
                .map_err(|e| PlanError::InvalidActionParams { index, kind: decl.kind.clone(), source: e })
        }
        "assign" => {
            let p: AssignParams = params_of(decl, index)?;
            Ok(Box::new(AssignAction::new(p.var, p.expr)))
        }
        "execution_expression" => {
            let p: ExecutionExpressionParams = params_of(decl, index)?;
            Ok(Box::new(ExecutionExpressionAction::new(p.cond)))
        }
        "check_proc" => {
            let p: CheckProcParams = params_of(decl, index)?;
            Ok(Box::new(CheckProcAction::new(p.host, p.pid, p.user, remote.clone())))
        }
        "send_email" => {
            let p: SendEmailParams = params_of(decl, index)?;
            Ok(Box::new(SendEmailAction::new(p.subject, p.content, p.to, p.attachment)))
        }
        "crash" => {
            let p: TargetParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(CrashAction::new(target, remote.clone())))
        }
        "start" => {
            let p: TargetParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(StartAction::new(target, remote.clone())))
        }
        "stop" => {
            let p: TargetParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(StopAction::new(target, remote.clone())))
        }
        "clean_data" => {
            let p: CleanDataParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(CleanDataAction::new(target, remote.clone(), p.space_id)))
        }
        "clean_wal" => {
            let p: SpaceTargetParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(CleanWalAction::new(target, remote.clone(), p.space_id)))
        }
        "clean_checkpoint" => {
            let p: TargetParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(CleanCheckpointAction::new(target, remote.clone())))
        }
        "restore_checkpoint" => {
            let p: TargetParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(RestoreFromCheckpointAction::new(target, remote.clone())))
        }
        "restore_data_dir" => {
            let p: RestoreDataDirParams = params_of(decl, index)?;
            let target = resolve_instance(instances, index, &decl.kind, &p.target)?;
            Ok(Box::new(RestoreFromDataDirAction::new(target, remote.clone(), p.src_data_path)))
        }
        "client_connect" => {
            let p: ClientConnectParams = params_of(decl, index)?;
            Ok(Box::new(ClientConnectAction::new(client.clone(), p.username, p.password)))
        }
        "write_circle" => {
            let p: WriteCircleParams = params_of(decl, index)?;
            Ok(Box::new(WriteCircleAction::new(client.clone(), p.tag, p.col, p.total_rows)))
        }
        "walk_through" => {
            let p: WalkThroughParams = params_of(decl, index)?;
            Ok(Box::new(WalkThroughAction::new(client.clone(), p.tag, p.col, p.total_rows, p.start)))
        }
        "create_space" => {
            let p: CreateSpaceParams = params_of(decl, index)?;
            Ok(Box::new(MetaActionAdapter(CreateSpaceAction::new(client.clone(), p.space_name, p.replica, p.parts))))
        }
        "use_space" => {
            let p: SpaceNameParams = params_of(decl, index)?;
            Ok(Box::new(MetaActionAdapter(UseSpaceAction::new(client.clone(), p.space_name))))
        }
        "create_schema" => {
            let p: CreateSchemaParams = params_of(decl, index)?;
            Ok(Box::new(MetaActionAdapter(CreateSchemaAction::new(client.clone(), p.name, p.props, p.is_edge))))
        }
        "balance_leader" => Ok(Box::new(MetaActionAdapter(BalanceLeaderAction::new(client.clone())))),
        "balance_data" => {
            let p: BalanceDataParams = params_of(decl, index)?;
            Ok(Box::new(MetaActionAdapter(BalanceDataAction::new(client.clone(), p.retry_times))))
        }
        "desc_space" => {
            let p: SpaceNameParams = params_of(decl, index)?;
            Ok(Box::new(MetaActionAdapter(DescSpaceAction::new(client.clone(), p.space_name))))
        }
        "check_leaders" => {
            let p: CheckLeadersParams = params_of(decl, index)?;
            Ok(Box::new(MetaActionAdapter(CheckLeadersAction::new(client.clone(), p.expected_num))))
        }
        "update_configs" => {
            let p: UpdateConfigsParams = params_of(decl, index)?;
            UpdateConfigsAction::new(client.clone(), p.layer, p.name, p.value)
                .map(|a| Box::new(MetaActionAdapter(a)) as Box<dyn ActionBehavior>)
                .map_err(|e| PlanError::InvalidActionParams { index, kind: decl.kind.clone(), source: e })
        }
        "compaction" => Ok(Box::new(MetaActionAdapter(CompactionAction::new(client.clone())))),
        "create_checkpoint" => Ok(Box::new(MetaActionAdapter(CreateCheckpointAction::new(client.clone())))),
        "truncate_wal" => {
            let p: TruncateWalParams = params_of(decl, index)?;
            let targets = resolve_instances(instances, index, &decl.kind, &p.targets)?;
            Ok(Box::new(TruncateWalAction::new(targets, remote.clone(), p.space_id, p.part_id, p.count, p.bytes)))
        }
        "random_restart" => {
            let p: RandomRestartParams = params_of(decl, index)?;
            let targets = resolve_instances(instances, index, &decl.kind, &p.targets)?;
            let inner = RandomRestartAction::new(
                targets,
                remote.clone(),
                p.loop_times,
                Duration::from_millis(p.time_to_disturb_ms),
                Duration::from_millis(p.time_to_recover_ms),
                p.graceful,
            );
            Ok(Box::new(DisturbActionAdapter::new(inner, "random restart")))
        }
        "random_partition" => {
            let p: RandomPartitionParams = params_of(decl, index)?;
            let metas = resolve_instances(instances, index, &decl.kind, &p.metas)?;
            let storages = resolve_instances(instances, index, &decl.kind, &p.storages)?;
            let inner = RandomPartitionAction::new(
                metas,
                storages,
                remote.clone(),
                p.loop_times,
                Duration::from_millis(p.time_to_disturb_ms),
                Duration::from_millis(p.time_to_recover_ms),
            );
            Ok(Box::new(DisturbActionAdapter::new(inner, "random partition")))
        }
        "random_traffic_control" => {
            let p: RandomTrafficControlParams = params_of(decl, index)?;
            let storages = resolve_instances(instances, index, &decl.kind, &p.storages)?;
            let inner = RandomTrafficControlAction::new(
                storages,
                remote.clone(),
                p.loop_times,
                Duration::from_millis(p.time_to_disturb_ms),
                Duration::from_millis(p.time_to_recover_ms),
                p.device,
                p.delay,
                p.jitter,
                p.loss_pct,
                p.duplicate_pct,
            );
            Ok(Box::new(DisturbActionAdapter::new(inner, "random traffic control")))
        }
        "fill_disk" => {
            let p: FillDiskParams = params_of(decl, index)?;
            let storages = resolve_instances(instances, index, &decl.kind, &p.storages)?;
            let inner = FillDiskAction::new(
                storages,
                remote.clone(),
                p.loop_times,
                Duration::from_millis(p.time_to_disturb_ms),
                Duration::from_millis(p.time_to_recover_ms),
                p.count,
            );
            Ok(Box::new(DisturbActionAdapter::new(inner, "fill disk")))
        }
        "slow_disk" => {
            let p: SlowDiskParams = params_of(decl, index)?;
            let storages = resolve_instances(instances, index, &decl.kind, &p.storages)?;
            let inner = SlowDiskAction::new(
                storages,
                remote.clone(),
                p.loop_times,
                Duration::from_millis(p.time_to_disturb_ms),
                Duration::from_millis(p.time_to_recover_ms),
                p.delay_ms,
            );
            Ok(Box::new(DisturbActionAdapter::new(inner, "slow disk")))
        }
        "loop" => {
            let p: LoopParams = params_of(decl, index)?;
            let sub_nodes = build_action_list(&p.actions, instances, client, remote)?;
            Ok(Box::new(LoopAction::new(p.cond, sub_nodes, p.concurrency)))
        }
        other => Err(PlanError::UnknownActionKind { index, kind: other.to_string() }),
    }
}

#[derive(Deserialize)]
struct WaitParams {
    wait_time_ms: u64,
}

#[derive(Deserialize)]
struct AssignParams {
    var: String,
    expr: String,
}

#[derive(Deserialize)]
struct ExecutionExpressionParams {
    cond: String,
}

#[derive(Deserialize)]
struct CheckProcParams {
    host: String,
    pid: u32,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Deserialize)]
struct SendEmailParams {
    subject: String,
    content: String,
    to: String,
    #[serde(default)]
    attachment: Option<String>,
}

#[derive(Deserialize)]
struct TargetParams {
    target: String,
}

#[derive(Deserialize)]
struct CleanDataParams {
    target: String,
    #[serde(default)]
    space_id: Option<i64>,
}

#[derive(Deserialize)]
struct SpaceTargetParams {
    target: String,
    space_id: i64,
}

#[derive(Deserialize)]
struct RestoreDataDirParams {
    target: String,
    src_data_path: String,
}

#[derive(Deserialize)]
struct ClientConnectParams {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct WriteCircleParams {
    tag: String,
    col: String,
    total_rows: u64,
}

#[derive(Deserialize)]
struct WalkThroughParams {
    tag: String,
    col: String,
    total_rows: u64,
    start: u64,
}

#[derive(Deserialize)]
struct CreateSpaceParams {
    space_name: String,
    replica: i32,
    parts: i32,
}

#[derive(Deserialize)]
struct SpaceNameParams {
    space_name: String,
}

#[derive(Deserialize)]
struct CreateSchemaParams {
    name: String,
    #[serde(default)]
    props: Vec<(String, String)>,
    is_edge: bool,
}

#[derive(Deserialize)]
struct BalanceDataParams {
    #[serde(default = "default_retry_times")]
    retry_times: u32,
}

fn default_retry_times() -> u32 {
    32
}

#[derive(Deserialize)]
struct CheckLeadersParams {
    expected_num: i64,
}

#[derive(Deserialize)]
struct UpdateConfigsParams {
    layer: String,
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct TruncateWalParams {
    targets: Vec<String>,
    space_id: i64,
    part_id: i32,
    count: usize,
    bytes: u64,
}

#[derive(Deserialize)]
struct RandomRestartParams {
    targets: Vec<String>,
    loop_times: u32,
    time_to_disturb_ms: u64,
    time_to_recover_ms: u64,
    #[serde(default)]
    graceful: bool,
}

#[derive(Deserialize)]
struct RandomPartitionParams {
    metas: Vec<String>,
    storages: Vec<String>,
    loop_times: u32,
    time_to_disturb_ms: u64,
    time_to_recover_ms: u64,
}

#[derive(Deserialize)]
struct RandomTrafficControlParams {
    storages: Vec<String>,
    loop_times: u32,
    time_to_disturb_ms: u64,
    time_to_recover_ms: u64,
    device: String,
    delay: String,
    jitter: String,
    loss_pct: i32,
    duplicate_pct: i32,
}

#[derive(Deserialize)]
struct FillDiskParams {
    storages: Vec<String>,
    loop_times: u32,
    time_to_disturb_ms: u64,
    time_to_recover_ms: u64,
    count: usize,
}

#[derive(Deserialize)]
struct SlowDiskParams {
    storages: Vec<String>,
    loop_times: u32,
    time_to_disturb_ms: u64,
    time_to_recover_ms: u64,
    delay_ms: u32,
}

#[derive(Deserialize)]
struct LoopParams {
    cond: String,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
    actions: Vec<ActionDecl>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(actions: Vec<Value>) -> PlanDocument {
        serde_json::from_value(json!({
            "name": "test-plan",
            "instances": [],
            "actions": actions,
        }))
        .unwrap()
    }

    #[test]
    fn rejects_empty_plan() {
        let d = doc(vec![]);
        assert!(matches!(build_plan(d), Err(PlanError::EmptyPlan)));
    }

    #[test]
    fn rejects_unknown_action_kind() {
        let d = doc(vec![json!({"kind": "not_a_real_action", "params": {}, "depends": []})]);
        assert!(matches!(build_plan(d), Err(PlanError::UnknownActionKind { index: 0, .. })));
    }

    #[test]
    fn rejects_forward_dependency() {
        let d = doc(vec![
            json!({"kind": "empty", "params": {}, "depends": [1]}),
            json!({"kind": "empty", "params": {}, "depends": []}),
        ]);
        assert!(matches!(build_plan(d), Err(PlanError::UnresolvedDependency { index: 0, depends_on: 1 })));
    }

    #[test]
    fn rejects_self_dependency() {
        let d = doc(vec![json!({"kind": "empty", "params": {}, "depends": [0]})]);
        assert!(matches!(build_plan(d), Err(PlanError::UnresolvedDependency { index: 0, depends_on: 0 })));
    }

    #[test]
    fn builds_a_simple_chain() {
        let d = doc(vec![
            json!({"kind": "assign", "params": {"var": "a", "expr": "1+2*3"}, "depends": []}),
            json!({"kind": "execution_expression", "params": {"cond": "$a == 7"}, "depends": [0]}),
        ]);
        let plan = build_plan(d).expect("plan should build");
        assert_eq!(plan.name, "test-plan");
    }

    #[tokio::test]
    async fn assign_then_check_reaches_success() {
        let d = doc(vec![
            json!({"kind": "assign", "params": {"var": "a", "expr": "1+2*3"}, "depends": []}),
            json!({"kind": "execution_expression", "params": {"cond": "$a == 7"}, "depends": [0]}),
        ]);
        let plan = build_plan(d).expect("plan should build");
        let report = plan.run().await;
        assert_eq!(report.status, crate::plan::PlanStatus::Succeeded);
    }
}
