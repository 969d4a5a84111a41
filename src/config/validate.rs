// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::cli::{SERVE_TARGET, WATCH_TARGET};
use crate::config::model::{ConfigFile, RawConfigFile, TaskKind};
use crate::errors::{PipelineError, Result};
use crate::types::parse_duration;
use crate::watch::patterns::build_globset;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Semantic checks run before a config is accepted:
///
/// - at least one task
/// - no reserved or duplicated names across tasks and pipelines
/// - each task declares at most one action kind, with its required fields
/// - every reference (`after`, pipelines, watch `run`, `serve.build`) resolves
/// - no cycles through `after` or pipeline references
/// - globs, regexes and durations parse
fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_names(cfg)?;
    validate_task_actions(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_expression_references(cfg)?;
    validate_dag(cfg)?;
    validate_patterns(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_names(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.task.keys().chain(cfg.pipeline.keys()) {
        if name == SERVE_TARGET || name == WATCH_TARGET {
            return Err(PipelineError::ConfigError(format!(
                "'{}' is a reserved target name and cannot be used for a task or pipeline",
                name
            )));
        }
    }

    if let Some(name) = cfg.pipeline.keys().find(|p| cfg.task.contains_key(*p)) {
        return Err(PipelineError::DuplicateName(name.clone()));
    }

    Ok(())
}

fn validate_task_actions(cfg: &RawConfigFile) -> Result<()> {
    let default_timeout = cfg.default.timeout.as_deref();
    if let Some(t) = default_timeout {
        parse_duration(t).map_err(|e| {
            PipelineError::ConfigError(format!("invalid [default].timeout: {e}"))
        })?;
    }

    for (name, task) in cfg.task.iter() {
        let kinds = task.declared_kinds();
        if kinds.len() > 1 {
            return Err(PipelineError::ConfigError(format!(
                "task '{}' declares more than one action ({:?}); use exactly one of `cmd`, `clean`, `src`",
                name, kinds
            )));
        }

        match task.kind() {
            TaskKind::Transform => {
                if task.dest.is_none() {
                    return Err(PipelineError::ConfigError(format!(
                        "task '{}' has `src` but no `dest`",
                        name
                    )));
                }
                if task.src.as_ref().is_some_and(|s| s.is_empty()) {
                    return Err(PipelineError::ConfigError(format!(
                        "task '{}' has an empty `src` list",
                        name
                    )));
                }
            }
            TaskKind::Group => {
                if task.after.is_empty() {
                    return Err(PipelineError::ConfigError(format!(
                        "task '{}' has no action (`cmd`, `clean` or `src`) and no `after` tasks",
                        name
                    )));
                }
            }
            TaskKind::Command | TaskKind::Clean => {}
        }

        if task.kind() != TaskKind::Transform
            && (task.transform.is_some()
                || task.rename.is_some()
                || task.concat.is_some()
                || !task.replace.is_empty())
        {
            return Err(PipelineError::ConfigError(format!(
                "task '{}' uses transform options without `src`",
                name
            )));
        }

        if let Some(t) = &task.timeout {
            parse_duration(t).map_err(|e| {
                PipelineError::ConfigError(format!("task '{}' has invalid timeout: {e}", name))
            })?;
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) && !cfg.pipeline.contains_key(dep) {
                return Err(PipelineError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(PipelineError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_expression_references(cfg: &RawConfigFile) -> Result<()> {
    let known = |n: &str| cfg.task.contains_key(n) || cfg.pipeline.contains_key(n);

    let pipeline_refs = cfg.pipeline.values().flat_map(|e| e.referenced_names());
    let watch_refs = cfg.watch.values().flat_map(|w| w.run.referenced_names());

    for name in pipeline_refs.chain(watch_refs) {
        if !known(name) {
            return Err(PipelineError::UnknownTask(name.to_string()));
        }
    }

    // `serve.build` defaults to "build", which only has to exist when serving.
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: referenced -> referrer.
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B. A pipeline gets an edge from every name it uses.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys().chain(cfg.pipeline.keys()) {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    for (name, expr) in cfg.pipeline.iter() {
        for used in expr.referenced_names() {
            if used == name {
                return Err(PipelineError::DagCycle(format!(
                    "cycle detected: pipeline '{}' references itself",
                    name
                )));
            }
            graph.add_edge(used, name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(PipelineError::DagCycle(format!(
                "cycle detected in task graph involving '{}'",
                node
            )))
        }
    }
}

fn validate_patterns(cfg: &RawConfigFile) -> Result<()> {
    let check = |owner: &str, patterns: &[String]| -> Result<()> {
        let stripped: Vec<String> = patterns
            .iter()
            .map(|p| p.strip_prefix('!').unwrap_or(p).to_string())
            .collect();
        build_globset(&stripped)
            .map(|_| ())
            .map_err(|e| PipelineError::ConfigError(format!("{owner}: {e:#}")))
    };

    check("[default].exclude", &cfg.default.exclude)?;

    for (name, task) in cfg.task.iter() {
        if let Some(src) = &task.src {
            check(&format!("task '{name}' src"), src)?;
        }
        if let Some(exclude) = &task.exclude {
            check(&format!("task '{name}' exclude"), exclude)?;
        }
        for rep in task.replace.iter() {
            regex::Regex::new(&rep.pattern).map_err(|e| {
                PipelineError::ConfigError(format!(
                    "task '{}' has invalid replace pattern '{}': {}",
                    name, rep.pattern, e
                ))
            })?;
        }
    }

    for (name, watch) in cfg.watch.iter() {
        if watch.patterns.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "watch '{}' has no patterns",
                name
            )));
        }
        check(&format!("watch '{name}' patterns"), &watch.patterns)?;
        if let Some(exclude) = &watch.exclude {
            check(&format!("watch '{name}' exclude"), exclude)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn accepts_a_minimal_pipeline() {
        let cfg = parse(
            r#"
[task.clean]
clean = "dist"

[task.css]
src = ["src/css/*.css"]
dest = "dist/css"

[pipeline.build]
seq = ["clean", { par = ["css"] }]
"#,
        )
        .unwrap();
        assert_eq!(cfg.tasks().len(), 2);
        assert_eq!(cfg.pipelines().len(), 1);
    }

    #[test]
    fn rejects_reserved_names() {
        let err = parse("[task.serve]\ncmd = \"true\"\n").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(msg) if msg.contains("reserved")));
    }

    #[test]
    fn rejects_task_and_pipeline_with_same_name() {
        let err = parse(
            r#"
[task.css]
cmd = "true"

[pipeline.css]
par = ["css"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateName(n) if n == "css"));
    }

    #[test]
    fn rejects_multiple_action_kinds() {
        let err = parse(
            r#"
[task.x]
cmd = "true"
clean = "dist"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(msg) if msg.contains("more than one action")));
    }

    #[test]
    fn rejects_src_without_dest() {
        let err = parse("[task.x]\nsrc = [\"a/*.css\"]\n").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(msg) if msg.contains("no `dest`")));
    }

    #[test]
    fn rejects_unknown_pipeline_reference() {
        let err = parse(
            r#"
[task.css]
cmd = "true"

[pipeline.build]
par = ["css", "js"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTask(n) if n == "js"));
    }

    #[test]
    fn rejects_cycle_through_pipeline() {
        let err = parse(
            r#"
[task.a]
cmd = "true"
after = ["p"]

[pipeline.p]
seq = ["a"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::DagCycle(_)));
    }

    #[test]
    fn rejects_bad_regex_and_glob() {
        let err = parse(
            r#"
[task.html]
src = ["dist/**/*.html"]
dest = "dist"
replace = [{ pattern = "(", with = "" }]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(msg) if msg.contains("replace pattern")));

        let err = parse(
            r#"
[task.css]
src = ["src/{css"]
dest = "dist"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }
}
