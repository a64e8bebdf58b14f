//! Subcommand execution.

use crate::formatter::{create_formatter, Formatter};
use crate::{Args, Command};
use featsql_core::mutation::{MutationCompiler, MutationRunner, ValueContainer};
use featsql_core::proto::{filter_from_json, FeatureQuery, MutationKind, SortKey, ValueOp};
use featsql_core::sql::{QueryTemplates, QueryWindow};
use featsql_core::ProviderConfig;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Mapping, configuration or compile error.
    #[error(transparent)]
    Core(#[from] featsql_core::Error),

    /// A filter file is not a valid filter.
    #[error("invalid filter: {0}")]
    Filter(#[from] featsql_core::proto::Error),

    /// A value operations file is not valid JSON.
    #[error("invalid value operations: {0}")]
    Values(#[from] serde_json::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("unknown feature type '{0}'")]
    UnknownFeatureType(String),

    #[error("invalid sort key '{0}', expected column or column:desc")]
    SortKey(String),
}

/// Run the selected subcommand and return formatted output.
pub fn execute(args: &Args) -> Result<String, ExecuteError> {
    let config = ProviderConfig::from_path(&args.config)?;
    let formatter = create_formatter(args.format);
    debug!(config = %args.config.display(), types = config.types.len(), "loaded configuration");

    match &args.command {
        Command::Tree { feature_type } => {
            let templates = templates(&config, feature_type)?;
            Ok(formatter.format_tree(templates.root()))
        }
        Command::Query {
            feature_type,
            limit,
            offset,
            sort,
            filter,
            id,
        } => {
            let mut query = FeatureQuery::new(feature_type.clone())
                .with_limit(*limit)
                .with_offset(*offset);
            for key in sort {
                query = query.with_sort_key(parse_sort_key(key)?);
            }
            if let Some(path) = filter {
                query = query.with_filter(filter_from_json(&read(path)?)?);
            }
            query.id = id.clone();
            compile_query(&config, &query, formatter.as_ref())
        }
        Command::Mutate {
            feature_type,
            values,
            update,
            delete,
        } => {
            let ops: Vec<ValueOp> = match values {
                Some(path) => serde_json::from_str(&read(path)?)?,
                None => vec![],
            };
            let kind = match (update, delete) {
                (Some(id), _) => MutationKind::Update { id: id.clone() },
                (None, Some(id)) => MutationKind::Delete { id: id.clone() },
                (None, None) => MutationKind::Create,
            };
            compile_mutation(&config, feature_type, &kind, &ops, formatter.as_ref())
        }
    }
}

fn templates(config: &ProviderConfig, feature_type: &str) -> Result<QueryTemplates, ExecuteError> {
    let mapping = config
        .feature_type(feature_type)
        .ok_or_else(|| ExecuteError::UnknownFeatureType(feature_type.to_string()))?;
    Ok(QueryTemplates::from_mapping(mapping, config)?)
}

/// Render the meta query and every value query of a read.
fn compile_query(
    config: &ProviderConfig,
    query: &FeatureQuery,
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    let templates = templates(config, &query.feature_type)?;
    let filter = query.effective_filter();
    let window = QueryWindow::new(config.effective_limit(query.limit), query.offset)
        .with_sort_keys(&query.sort_keys)
        .with_filter(filter.as_ref())
        .with_id_lookup(query.returns_single_feature());

    let mut queries = vec![("meta".to_string(), templates.meta_query(&window)?)];
    for (template, sql) in templates
        .value_templates()
        .iter()
        .zip(templates.value_queries(&window)?)
    {
        queries.push((template.path().to_string(), sql));
    }
    Ok(formatter.format_queries(&queries))
}

/// Render the statements of a write, numbering inserted rows from 1.
fn compile_mutation(
    config: &ProviderConfig,
    feature_type: &str,
    kind: &MutationKind,
    ops: &[ValueOp],
    formatter: &dyn Formatter,
) -> Result<String, ExecuteError> {
    let templates = templates(config, feature_type)?;
    let mut values = ValueContainer::new(templates.root());
    values.apply(ops)?;
    let statements = MutationCompiler::new(templates.root(), templates.dialect())
        .with_srid(config.native_srid)
        .compile(kind, &values)?;
    let rendered = MutationRunner::dry_run(&statements)?;

    let rows: Vec<(String, String, String)> = statements
        .iter()
        .zip(rendered)
        .map(|(s, sql)| (s.kind.to_string(), s.table.clone(), sql))
        .collect();
    Ok(formatter.format_statements(&rows))
}

fn parse_sort_key(text: &str) -> Result<SortKey, ExecuteError> {
    match text.split_once(':') {
        None if !text.is_empty() => Ok(SortKey::asc(text)),
        Some((field, direction)) if !field.is_empty() => match direction.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortKey::asc(field)),
            "desc" => Ok(SortKey::desc(field)),
            _ => Err(ExecuteError::SortKey(text.to_string())),
        },
        _ => Err(ExecuteError::SortKey(text.to_string())),
    }
}

fn read(path: &Path) -> Result<String, ExecuteError> {
    std::fs::read_to_string(path).map_err(|source| ExecuteError::Read {
        path: path.display().to_string(),
        source,
    })
}
