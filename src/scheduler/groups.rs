//! 依赖分组
//!
//! 入度表 + 邻接表分层：无依赖的任务在第 0 组，其余任务的组号 = 1 + 其依赖组号的最大值。
//! 依赖未知 id、处于环中或依赖了无法调度任务的任务不进入任何组；
//! 同一 id 只有第一次出现的任务参与分组，后续重复者不可调度。

use std::collections::{HashMap, HashSet};

use crate::plan::{MicroTask, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unschedulable {
    pub task_id: TaskId,
    /// 在输入任务列表中的下标
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGroups {
    /// 按执行顺序排列，组内保持计划顺序
    pub groups: Vec<Vec<TaskId>>,
    pub unschedulable: Vec<Unschedulable>,
}

impl DependencyGroups {
    pub fn group_of(&self, task_id: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.iter().any(|id| id == task_id))
    }
}

pub fn dependency_groups(tasks: &[MicroTask]) -> DependencyGroups {
    let mut order: HashMap<&str, usize> = HashMap::new();
    for (i, t) in tasks.iter().enumerate() {
        order.entry(t.id.as_str()).or_insert(i);
    }
    let is_first = |i: usize, t: &MicroTask| order[t.id.as_str()] == i;

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut unschedulable = Vec::new();
    let mut invalid: HashSet<&str> = HashSet::new();

    for (i, task) in tasks.iter().enumerate() {
        if !is_first(i, task) {
            unschedulable.push(Unschedulable {
                task_id: task.id.clone(),
                position: i,
                reason: "duplicate task id".to_string(),
            });
            continue;
        }
        let deps: HashSet<&str> = task.dependencies.iter().map(String::as_str).collect();
        if let Some(unknown) = deps.iter().find(|d| !order.contains_key(*d)) {
            invalid.insert(task.id.as_str());
            unschedulable.push(Unschedulable {
                task_id: task.id.clone(),
                position: i,
                reason: format!("unknown dependency `{unknown}`"),
            });
            continue;
        }
        in_degree.insert(task.id.as_str(), deps.len());
        for dep in deps {
            adjacency.entry(dep).or_default().push(task.id.as_str());
        }
    }

    let mut groups: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = tasks
        .iter()
        .enumerate()
        .filter(|&(i, t)| is_first(i, t))
        .map(|(_, t)| t.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &id in &current {
            for &dependent in adjacency.get(id).map(Vec::as_slice).unwrap_or_default() {
                let Some(degree) = in_degree.get_mut(dependent) else {
                    continue;
                };
                *degree -= 1;
                if *degree == 0 {
                    next.push(dependent);
                }
            }
        }
        current.sort_by_key(|id| order[id]);
        groups.push(current);
        current = next;
    }

    let placed: HashSet<&str> = groups.iter().flatten().copied().collect();
    for (i, task) in tasks.iter().enumerate() {
        let id = task.id.as_str();
        if !is_first(i, task) || invalid.contains(id) || placed.contains(id) {
            continue;
        }
        let reason = if task.dependencies.iter().any(|d| invalid.contains(d.as_str())) {
            "depends on an unschedulable task".to_string()
        } else {
            "dependency cycle".to_string()
        };
        unschedulable.push(Unschedulable {
            task_id: task.id.clone(),
            position: i,
            reason,
        });
    }

    DependencyGroups {
        groups: groups
            .into_iter()
            .map(|g| g.into_iter().map(str::to_string).collect())
            .collect(),
        unschedulable,
    }
}
