//! Task dependency graph: build, validate, and stage the work DAG.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::boundary::Executor;
use crate::error::{ForemanError, Result};
use crate::task::{Task, TaskStatus};
use crate::workitem::WorkItem;

/// Directed acyclic graph of tasks for one workflow.
///
/// Owned exclusively by the scheduling coordinator; mutation happens only on
/// its control-flow path, so the graph itself is never shared across workers.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: HashMap<String, Task>,
    /// Insertion order, kept for deterministic iteration.
    order: Vec<String>,
    /// Reverse edges: task id -> ids that depend on it.
    dependents: HashMap<String, Vec<String>>,
}

impl TaskGraph {
    /// Collect contributed tasks from each assigned executor and validate
    /// the combined graph.
    pub async fn build(executors: &[Arc<dyn Executor>], item: &WorkItem) -> Result<Self> {
        let mut tasks = Vec::new();
        for executor in executors {
            let executor_id = executor.descriptor().id.clone();
            let specs = executor.plan_tasks(item).await?;
            debug!(executor = %executor_id, contributed = specs.len(), "Executor planned tasks");
            for spec in specs {
                tasks.push(Task::from_spec(spec, executor_id.clone()));
            }
        }
        Self::from_tasks(tasks)
    }

    /// Validate referential integrity and acyclicity of a prepared task set.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self> {
        let mut graph = Self::default();

        for task in tasks {
            if graph.tasks.contains_key(&task.id) {
                return Err(ForemanError::DuplicateTask(task.id));
            }
            graph.order.push(task.id.clone());
            graph.tasks.insert(task.id.clone(), task);
        }

        // Referential integrity before anything else touches the edges.
        for id in &graph.order {
            let task = &graph.tasks[id];
            for dep in &task.depends_on {
                if !graph.tasks.contains_key(dep) {
                    return Err(ForemanError::DanglingDependency {
                        task_id: id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        for id in &graph.order {
            for dep in &graph.tasks[id].depends_on {
                graph
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(id.clone());
            }
        }

        graph.check_acyclic()?;
        debug!(tasks = graph.order.len(), "Task graph built");
        Ok(graph)
    }

    /// DFS with recursion-stack coloring. A back edge to a gray node is a
    /// cycle and is fatal; the error carries the offending path.
    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: HashMap<&str, Color> =
            self.order.iter().map(|id| (id.as_str(), Color::White)).collect();

        for start in &self.order {
            if colors[start.as_str()] != Color::White {
                continue;
            }
            // Iterative DFS; the stack mirrors the recursion path so the
            // cycle can be reported in dependency order.
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            colors.insert(start.as_str(), Color::Gray);

            while let Some((id, next_child)) = stack.pop() {
                let deps = &self.tasks[id].depends_on;
                if next_child < deps.len() {
                    stack.push((id, next_child + 1));
                    let dep = deps[next_child].as_str();
                    match colors[dep] {
                        Color::White => {
                            colors.insert(dep, Color::Gray);
                            stack.push((dep, 0));
                        }
                        Color::Gray => {
                            let mut path: Vec<String> = stack
                                .iter()
                                .map(|(node, _)| (*node).to_string())
                                .skip_while(|node| node != dep)
                                .collect();
                            path.push(dep.to_string());
                            return Err(ForemanError::CycleDetected { path });
                        }
                        Color::Black => {}
                    }
                } else {
                    colors.insert(id, Color::Black);
                }
            }
        }
        Ok(())
    }

    /// The maximal set of Pending tasks whose dependencies are all Completed.
    pub fn next_stage(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                let task = &self.tasks[*id];
                task.status == TaskStatus::Pending
                    && task
                        .depends_on
                        .iter()
                        .all(|dep| self.tasks[dep].status == TaskStatus::Completed)
            })
            .cloned()
            .collect()
    }

    /// Topological stage preview via repeated Kahn passes, ignoring runtime
    /// status. Valid only because construction proved acyclicity.
    pub fn planned_stages(&self) -> Vec<Vec<String>> {
        let mut stages = Vec::new();
        let mut placed: HashSet<String> = HashSet::new();

        while placed.len() < self.order.len() {
            let stage: Vec<String> = self
                .order
                .iter()
                .filter(|id| !placed.contains(id.as_str()))
                .filter(|id| {
                    self.tasks[*id]
                        .depends_on
                        .iter()
                        .all(|dep| placed.contains(dep.as_str()))
                })
                .cloned()
                .collect();
            if stage.is_empty() {
                break;
            }
            placed.extend(stage.iter().cloned());
            stages.push(stage);
        }
        stages
    }

    /// Every task reachable from `id` through dependent edges.
    pub fn downstream(&self, id: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(id);

        let mut result = Vec::new();
        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.dependents.get(current) {
                for dep in dependents {
                    if seen.insert(dep.clone()) {
                        result.push(dep.clone());
                        queue.push_back(dep.as_str());
                    }
                }
            }
        }
        result
    }

    /// Apply a status transition, rejecting anything the task state machine
    /// does not allow.
    pub fn mark(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| ForemanError::Other(format!("unknown task: {}", id)))?;
        if !task.status.can_transition(status) {
            return Err(ForemanError::Other(format!(
                "illegal task transition for {}: {} -> {}",
                id, task.status, status
            )));
        }
        task.status = status;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().map(|id| &self.tasks[id])
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// True once every task is in a terminal status.
    pub fn is_settled(&self) -> bool {
        self.tasks().all(|t| t.status.is_terminal())
    }
}
