//! ConfigInjection and SecretInjection.
//!
//! Both checks resolve references against the submitted documents in the
//! Deployment's namespace; nothing is read from the cluster.

use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kubegrade_cluster::{ResourceDocument, ResourceKind, ResourceRef};

use super::{settle, view, CheckContext};
use crate::domain::outcome::CheckVerdict;
use crate::domain::workload::{ConfigMap, Container, Secret};

/// One reference from a container to a ConfigMap or Secret.
#[derive(Debug, Clone)]
struct Reference {
    container: String,
    name: Option<String>,
    /// `None` for bulk (`envFrom`) references.
    key: Option<String>,
    origin: &'static str,
}

fn config_refs(containers: &[Container]) -> Vec<Reference> {
    let mut refs = Vec::new();
    for (i, c) in containers.iter().enumerate() {
        for source in &c.env_from {
            if let Some(r) = &source.config_map_ref {
                refs.push(Reference {
                    container: c.display_name(i),
                    name: r.name.clone(),
                    key: None,
                    origin: "envFrom.configMapRef",
                });
            }
        }
        for var in &c.env {
            if let Some(r) = var.value_from.as_ref().and_then(|v| v.config_map_key_ref.as_ref()) {
                refs.push(Reference {
                    container: c.display_name(i),
                    name: r.name.clone(),
                    key: r.key.clone(),
                    origin: "env[].valueFrom.configMapKeyRef",
                });
            }
        }
    }
    refs
}

fn secret_key_refs(containers: &[Container]) -> Vec<Reference> {
    containers
        .iter()
        .enumerate()
        .flat_map(|(i, c)| {
            c.env.iter().filter_map(move |var| {
                let r = var.value_from.as_ref()?.secret_key_ref.as_ref()?;
                Some(Reference {
                    container: c.display_name(i),
                    name: r.name.clone(),
                    key: r.key.clone(),
                    origin: "env[].valueFrom.secretKeyRef",
                })
            })
        })
        .collect()
}

fn bulk_secret_names(containers: &[Container]) -> Vec<String> {
    containers
        .iter()
        .flat_map(|c| c.env_from.iter())
        .filter_map(|s| s.secret_ref.as_ref()?.name.clone())
        .collect()
}

fn lookup<'a>(
    ctx: &CheckContext<'a>,
    kind: ResourceKind,
    namespace: &str,
    name: &str,
) -> Option<&'a ResourceDocument> {
    ctx.submission
        .find(&ResourceRef::new(kind, namespace, name))
}

pub fn check_config(ctx: &CheckContext<'_>) -> CheckVerdict {
    settle(evaluate_config(ctx))
}

fn evaluate_config(ctx: &CheckContext<'_>) -> Result<CheckVerdict, CheckVerdict> {
    let (dep_doc, deployment) = ctx.deployment()?;
    let refs = config_refs(&deployment.spec.template.spec.containers);
    if refs.is_empty() {
        return Ok(CheckVerdict::Fail(format!(
            "no container in Deployment `{}` references a ConfigMap (envFrom.configMapRef or env[].valueFrom.configMapKeyRef)",
            dep_doc.name
        )));
    }

    let mut problems = Vec::new();
    let mut available_keys = BTreeSet::new();
    let mut injected = BTreeSet::new();
    let mut checked = BTreeSet::new();

    for r in &refs {
        let Some(name) = r.name.as_deref() else {
            problems.push(format!("{}: {} has no name", r.container, r.origin));
            continue;
        };
        let Some(doc) = lookup(ctx, ResourceKind::ConfigMap, &dep_doc.namespace, name) else {
            problems.push(format!(
                "{}: {} names ConfigMap `{name}`, which is not in the submission",
                r.container, r.origin
            ));
            continue;
        };
        let config_map: ConfigMap = view(doc)?;
        available_keys.extend(config_map.data.keys().cloned());
        available_keys.extend(config_map.binary_data.keys().cloned());
        if checked.insert(name.to_string()) {
            for key in &ctx.config.forbidden_config_keys {
                if config_map.has_key(key) {
                    problems.push(format!("ConfigMap `{name}` still defines key `{key}`"));
                }
            }
        }

        if let Some(key) = r.key.as_deref() {
            if !config_map.has_key(key) {
                problems.push(format!(
                    "{}: {} wants key `{key}`, which ConfigMap `{name}` does not define",
                    r.container, r.origin
                ));
                continue;
            }
        }
        injected.insert(name.to_string());
    }

    for key in &ctx.config.required_config_keys {
        if !available_keys.contains(key) {
            problems.push(format!("required configuration key `{key}` is not provided by any referenced ConfigMap"));
        }
    }

    if problems.is_empty() {
        let names: Vec<String> = injected.into_iter().map(|n| format!("`{n}`")).collect();
        Ok(CheckVerdict::Pass(format!(
            "Deployment `{}` injects ConfigMap {}",
            dep_doc.name,
            names.join(", ")
        )))
    } else {
        Ok(CheckVerdict::Fail(problems.join("; ")))
    }
}

pub fn check_secret(ctx: &CheckContext<'_>) -> CheckVerdict {
    settle(evaluate_secret(ctx))
}

fn evaluate_secret(ctx: &CheckContext<'_>) -> Result<CheckVerdict, CheckVerdict> {
    let (dep_doc, deployment) = ctx.deployment()?;
    let containers = &deployment.spec.template.spec.containers;
    let refs = secret_key_refs(containers);

    if refs.is_empty() {
        let bulk = bulk_secret_names(containers);
        return Ok(CheckVerdict::Fail(if bulk.is_empty() {
            format!(
                "no container in Deployment `{}` references a Secret via env[].valueFrom.secretKeyRef",
                dep_doc.name
            )
        } else {
            format!(
                "Secret `{}` is only injected in bulk via envFrom.secretRef; reference individual keys with env[].valueFrom.secretKeyRef",
                bulk.join("`, `")
            )
        }));
    }

    let mut problems = Vec::new();
    let mut validated = BTreeSet::new();

    for r in &refs {
        let (Some(name), Some(key)) = (r.name.as_deref(), r.key.as_deref()) else {
            problems.push(format!("{}: {} needs both name and key", r.container, r.origin));
            continue;
        };
        let Some(doc) = lookup(ctx, ResourceKind::Secret, &dep_doc.namespace, name) else {
            problems.push(format!(
                "{}: {} names Secret `{name}`, which is not in the submission",
                r.container, r.origin
            ));
            continue;
        };
        let secret: Secret = view(doc)?;
        if !secret.has_key(key) {
            problems.push(format!(
                "{}: {} wants key `{key}`, which Secret `{name}` does not define",
                r.container, r.origin
            ));
        }
        if validated.insert(name.to_string()) {
            problems.extend(encoding_problems(name, &secret));
            if let Some(expected) = ctx.config.secret_type.as_deref() {
                let actual = secret.secret_type.as_deref().unwrap_or("Opaque");
                if actual != expected {
                    problems.push(format!(
                        "Secret `{name}` has type {actual}, expected {expected}"
                    ));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(CheckVerdict::Pass(format!(
            "Deployment `{}` reads {} secret key(s) by reference",
            dep_doc.name,
            refs.len()
        )))
    } else {
        Ok(CheckVerdict::Fail(problems.join("; ")))
    }
}

/// Every `data` value must be non-empty standard base64.
fn encoding_problems(name: &str, secret: &Secret) -> Vec<String> {
    secret
        .data
        .iter()
        .filter_map(|(key, value)| {
            let value = value.trim();
            if value.is_empty() {
                return Some(format!("Secret `{name}` data.{key} is empty"));
            }
            match STANDARD.decode(value) {
                Ok(bytes) if bytes.is_empty() => Some(format!("Secret `{name}` data.{key} decodes to nothing")),
                Ok(_) => None,
                Err(e) => Some(format!("Secret `{name}` data.{key} is not valid base64: {e}")),
            }
        })
        .collect()
}
