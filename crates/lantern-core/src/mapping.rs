//! Declarative merge templates
//!
//! A [`Mapping`] is a value tree whose string leaves may carry template
//! expressions. Evaluating it against the three request scopes (the
//! entity's static `values`, the request `metadata`, and the accumulated
//! `current` state) produces the next [`Intermediate`].
//!
//! Scoping rules:
//! - every top-level key of the (wrapped) accumulated intermediate is in
//!   scope, as is the whole prior state under `current`;
//! - `values` and `metadata` are always bound, whether or not the template
//!   mentions them, so templates can read them without declaring them;
//! - an undefined reference is an evaluation error, reported with the
//!   layer's debug tag.
//!
//! Output extraction: a top-level `output` sub-tree wins, else a top-level
//! `metadata` sub-tree, else the whole evaluated result.

use crate::error::{ConfigError, MappingError};
use crate::intermediate::{Intermediate, METADATA_KEY};
use crate::value::{fill_missing, Value, Values};
use minijinja::{Environment, UndefinedBehavior};

/// Reserved result key replacing the whole accumulated state.
pub const OUTPUT_KEY: &str = "output";

/// Scope name under which the entity's static values are bound.
pub const VALUES_KEY: &str = "values";

/// True if the string carries a substitution marker.
pub fn is_template(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

/// One-shot environment with strict undefined semantics.
pub(crate) fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// Syntax-check a template string without rendering it.
pub(crate) fn check_template(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.template_from_str(source)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Render a template string against a value context.
pub(crate) fn render_template(source: &str, ctx: &Values) -> Result<String, String> {
    let env = template_env();
    env.render_str(source, ctx).map_err(|e| {
        // minijinja chains the interesting detail (which variable was
        // undefined) onto the outer error; fold it into one line.
        let mut msg = e.to_string();
        let mut cause: &dyn std::error::Error = &e;
        while let Some(next) = cause.source() {
            msg.push_str(": ");
            msg.push_str(&next.to_string());
            cause = next;
        }
        msg
    })
}

/// Compiled declarative merge template.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    template: Values,
}

impl Mapping {
    /// Compile a template tree, syntax-checking every templated leaf.
    pub fn compile(name: &str, template: Value) -> Result<Self, ConfigError> {
        let Value::Map(template) = template else {
            return Err(ConfigError::InvalidMapping(format!(
                "{}: mapping must be a keyed map",
                name
            )));
        };
        check_tree(name, &Value::Map(template.clone()), &mut String::new())?;
        Ok(Self { template })
    }

    /// Evaluate against one layer's inputs, producing the next intermediate.
    ///
    /// `name` is the debug tag (e.g. `"matcher default/m1"`) used in
    /// evaluation errors.
    pub fn map(
        &self,
        name: &str,
        values: Option<&Values>,
        metadata: &Values,
        intermediate: &Intermediate,
    ) -> Result<Intermediate, MappingError> {
        let mut ctx = intermediate.wrap().into_values();
        ctx.insert(
            VALUES_KEY.to_string(),
            Value::Map(values.cloned().unwrap_or_default()),
        );
        ctx.insert(METADATA_KEY.to_string(), Value::Map(metadata.clone()));

        let evaluated = eval_tree(name, &Value::Map(self.template.clone()), &ctx)?;
        let Value::Map(evaluated) = evaluated else {
            // compile() guarantees a map at the top.
            return Err(MappingError::BadField {
                field: "mapping".to_string(),
            });
        };
        let result = Intermediate::from_values(evaluated);

        if let Some(output) = result.field(OUTPUT_KEY)? {
            return Ok(output);
        }
        if let Some(metadata) = result.field(METADATA_KEY)? {
            return Ok(metadata);
        }
        Ok(result)
    }
}

fn check_tree(name: &str, node: &Value, path: &mut String) -> Result<(), ConfigError> {
    match node {
        Value::String(s) if is_template(s) => check_template(s).map_err(|e| {
            ConfigError::InvalidMapping(format!("{}{}: {}", name, path, e))
        }),
        Value::Map(m) => {
            for (k, v) in m {
                let len = path.len();
                path.push('.');
                path.push_str(k);
                check_tree(name, v, path)?;
                path.truncate(len);
            }
            Ok(())
        }
        Value::List(l) => {
            for (i, v) in l.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{}]", i));
                check_tree(name, v, path)?;
                path.truncate(len);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn eval_tree(tag: &str, node: &Value, ctx: &Values) -> Result<Value, MappingError> {
    match node {
        Value::String(s) if is_template(s) => render_template(s, ctx)
            .map(Value::String)
            .map_err(|reason| MappingError::Eval {
                tag: tag.to_string(),
                reason,
            }),
        Value::Map(m) => {
            let mut out = Values::new();
            for (k, v) in m {
                out.insert(k.clone(), eval_tree(tag, v, ctx)?);
            }
            Ok(Value::Map(out))
        }
        Value::List(l) => {
            let mut out = Vec::with_capacity(l.len());
            for v in l {
                out.push(eval_tree(tag, v, ctx)?);
            }
            Ok(Value::List(out))
        }
        other => Ok(other.clone()),
    }
}

/// Apply one mapping layer, falling back to defaulting merge.
///
/// With a mapping the template decides everything. Without one, the
/// accumulated intermediate's keys win, the layer's static values fill only
/// gaps, and the reserved metadata key recurses one level instead of
/// short-circuiting.
pub fn map_layer(
    tag: &str,
    mapping: Option<&Mapping>,
    values: Option<&Values>,
    metadata: &Values,
    intermediate: Intermediate,
) -> Result<Intermediate, MappingError> {
    match mapping {
        Some(m) => {
            tracing::debug!(layer = tag, "mapping by template");
            m.map(tag, values, metadata, &intermediate)
        }
        None => match values {
            Some(v) if !v.is_empty() => {
                tracing::debug!(layer = tag, "mapping by defaulting");
                let mut base = intermediate.into_values();
                fill_missing(&mut base, v, &[METADATA_KEY]);
                Ok(Intermediate::from_values(base))
            }
            _ => Ok(intermediate),
        },
    }
}
