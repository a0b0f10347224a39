//! Workflow and step documents

use serde_json::Value;

use super::error::CwlError;

/// Macro replaced by the remote path of a project's installed files
pub const API_FILES_MACRO: &str = "$CERISE_API_FILES";

/// Parses a CWL document. YAML is a superset of JSON, so both are accepted.
pub fn parse_document(content: &[u8]) -> Result<Value, CwlError> {
    let value: Value = serde_yaml::from_slice(content)?;
    if !value.is_object() {
        return Err(CwlError::validation("document is not a mapping"));
    }
    Ok(value)
}

/// Returns true iff the top-level process is a `Workflow`, and not a
/// `CommandLineTool` or `ExpressionTool`.
pub fn is_workflow(workflow_content: &[u8]) -> Result<bool, CwlError> {
    let workflow = parse_document(workflow_content)?;
    Ok(workflow.get("class").and_then(Value::as_str) == Some("Workflow"))
}

/// Number of cores requested through a `ResourceRequirement` hint.
///
/// `coresMin` wins over `coresMax`; no hint means 0. Hints may be given as
/// a mapping keyed by class or as a list of objects with a `class` field.
pub fn get_required_num_cores(workflow_content: &[u8]) -> Result<u64, CwlError> {
    let workflow = parse_document(workflow_content)?;

    let requirement = match workflow.get("hints") {
        Some(Value::Object(hints)) => hints.get("ResourceRequirement"),
        Some(Value::Array(hints)) => hints
            .iter()
            .find(|hint| hint.get("class").and_then(Value::as_str) == Some("ResourceRequirement")),
        _ => None,
    };

    let Some(requirement) = requirement else {
        return Ok(0);
    };

    let cores = requirement
        .get("coresMin")
        .and_then(Value::as_u64)
        .or_else(|| requirement.get("coresMax").and_then(Value::as_u64))
        .unwrap_or(0);

    Ok(cores)
}

/// Points every step of a workflow at the installed API.
///
/// Each step must refer to its tool by a string of the form
/// `<project>/<path>`; embedded tools are rejected. The reference becomes
/// `<api_dir>/<project>/steps/<project>/<path>`. The result is serialized as
/// JSON whatever the input format was.
pub fn translate_workflow(workflow_content: &[u8], api_dir: &str) -> Result<Vec<u8>, CwlError> {
    let mut workflow = parse_document(workflow_content)?;

    let steps: Vec<&mut Value> = match workflow.get_mut("steps") {
        Some(Value::Object(steps)) => steps.values_mut().collect(),
        Some(Value::Array(steps)) => steps.iter_mut().collect(),
        Some(_) => return Err(CwlError::validation("workflow steps must be a mapping or a list")),
        None => return Err(CwlError::validation("workflow contains no steps")),
    };

    for step in steps {
        let run = step
            .get("run")
            .and_then(Value::as_str)
            .ok_or_else(|| CwlError::validation("invalid step in workflow: run must be a string"))?;

        let project = run.split('/').next().unwrap_or_default();
        let remote_run = format!("{}/{}/steps/{}", api_dir.trim_end_matches('/'), project, run);
        step["run"] = Value::String(remote_run);
    }

    Ok(serde_json::to_vec(&workflow)?)
}

/// Substitutes the files macro in an API step.
///
/// Only `CommandLineTool`s are rewritten: a `baseCommand` starting with the
/// macro has its first occurrence replaced, and every occurrence in every
/// string `arguments` entry is replaced.
pub fn translate_api_step(step_content: &[u8], files_dir: &str) -> Result<Value, CwlError> {
    let mut step = parse_document(step_content)?;

    if step.get("class").and_then(Value::as_str) != Some("CommandLineTool") {
        return Ok(step);
    }

    if let Some(base_command) = step.get_mut("baseCommand") {
        match base_command {
            Value::String(command) => substitute_leading(command, files_dir),
            Value::Array(parts) => {
                if let Some(Value::String(command)) = parts.first_mut() {
                    substitute_leading(command, files_dir);
                }
            }
            _ => {}
        }
    }

    if let Some(arguments) = step.get_mut("arguments") {
        let Value::Array(arguments) = arguments else {
            return Err(CwlError::validation("invalid step: arguments must be an array"));
        };
        for argument in arguments.iter_mut() {
            if let Value::String(text) = argument {
                *text = text.replace(API_FILES_MACRO, files_dir);
            }
        }
    }

    Ok(step)
}

fn substitute_leading(command: &mut String, files_dir: &str) {
    if command.trim_start().starts_with(API_FILES_MACRO) {
        *command = command.replacen(API_FILES_MACRO, files_dir, 1);
    }
}
