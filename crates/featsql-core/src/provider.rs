//! Feature provider: read and write orchestration over a SQL client.

use crate::config::ProviderConfig;
use crate::decode::{FeatureReconstructor, RowMerger, RowStream, SqlRow, ValueKind};
use crate::error::{Error, ExecutionError, Result};
use crate::mutation::{MutationCompiler, MutationRunner, Statement, ValueContainer};
use crate::sql::{QueryTemplates, QueryWindow};
use featsql_proto::{FeatureEvent, FeatureQuery, MutationKind, ValueOp, Value};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, error, warn};

/// The row source and sink backing a provider.
///
/// Transport, pooling and transactions belong to the implementation.
pub trait SqlClient: Send + Sync {
    /// Run a query and stream its rows in order. Values are rendered as
    /// text and tagged with their storage class.
    fn query(&self, sql: &str) -> std::result::Result<RowStream<'_>, ExecutionError>;

    /// Run a statement; returns the value of its `RETURNING` column, if any.
    fn execute(&self, sql: &str) -> std::result::Result<Option<String>, ExecutionError>;
}

/// Page metadata read from the meta query.
#[derive(Debug, Clone, PartialEq)]
struct PageMeta {
    min_key: Option<Value>,
    max_key: Option<Value>,
    number_returned: u64,
    number_matched: Option<u64>,
}

impl PageMeta {
    fn from_row(row: &SqlRow) -> Result<Self> {
        let count = |index: usize| -> Result<Option<i64>> {
            row.get(index)
                .map(|v| {
                    v.trim().parse::<i64>().map_err(|_| {
                        Error::Internal(format!("meta query returned non-numeric count '{}'", v))
                    })
                })
                .transpose()
        };
        Ok(Self {
            min_key: row.get(0).map(|v| key_value(v, row.kind(0))),
            max_key: row.get(1).map(|v| key_value(v, row.kind(1))),
            number_returned: count(2)?.unwrap_or(0).max(0) as u64,
            number_matched: count(3)?.filter(|n| *n >= 0).map(|n| n as u64),
        })
    }
}

fn key_value(text: &str, kind: ValueKind) -> Value {
    match (kind, text.parse::<i64>()) {
        (ValueKind::Integer, Ok(i)) => Value::Int(i),
        _ => Value::String(text.to_string()),
    }
}

/// Lazily decoded feature events of one read.
///
/// Rows are pulled from the value queries only as events are consumed, so
/// at most one row per join group and the events of one row are held at a
/// time. Dropping the stream releases the underlying row sources. After an
/// error the stream yields nothing more.
pub struct FeatureStream<'a> {
    merger: Option<RowMerger<'a>>,
    reconstructor: Option<FeatureReconstructor>,
    pending: VecDeque<FeatureEvent>,
}

impl<'a> FeatureStream<'a> {
    fn new(start: FeatureEvent, merger: Option<RowMerger<'a>>, reconstructor: FeatureReconstructor) -> Self {
        Self {
            merger,
            reconstructor: Some(reconstructor),
            pending: VecDeque::from([start]),
        }
    }

    fn empty(start: FeatureEvent) -> Self {
        Self {
            merger: None,
            reconstructor: None,
            pending: VecDeque::from([start, FeatureEvent::End]),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.merger = None;
        self.reconstructor = None;
        self.pending.clear();
        error
    }

    /// Decode rows until an event is available or the stream is exhausted.
    fn fill(&mut self) -> Result<()> {
        while self.pending.is_empty() {
            let Some(reconstructor) = self.reconstructor.as_mut() else {
                return Ok(());
            };
            match self.merger.as_mut().and_then(|m| m.next()) {
                Some(row) => self.pending.extend(reconstructor.push(row?)?),
                None => {
                    self.merger = None;
                    self.pending.extend(reconstructor.finish());
                    self.reconstructor = None;
                }
            }
        }
        Ok(())
    }

    /// Decode until the first feature opens. Returns false when the stream
    /// holds no feature.
    fn prime_feature(&mut self) -> Result<bool> {
        loop {
            if self.pending.iter().any(FeatureEvent::is_feature_start) {
                return Ok(true);
            }
            let (Some(reconstructor), Some(merger)) = (self.reconstructor.as_mut(), self.merger.as_mut()) else {
                return Ok(false);
            };
            match merger.next() {
                Some(row) => self.pending.extend(reconstructor.push(row?)?),
                None => return Ok(false),
            }
        }
    }
}

impl Iterator for FeatureStream<'_> {
    type Item = Result<FeatureEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            return Some(Err(self.fail(e)));
        }
        self.pending.pop_front().map(Ok)
    }
}

/// Serves feature reads and writes for the mapped feature types.
pub struct FeatureProvider<C> {
    config: ProviderConfig,
    templates: HashMap<String, QueryTemplates>,
    client: C,
}

impl<C: SqlClient> FeatureProvider<C> {
    /// Build the templates of every configured feature type.
    pub fn new(config: ProviderConfig, client: C) -> Result<Self> {
        config.validate()?;
        let mut templates = HashMap::new();
        for mapping in &config.types {
            let built = QueryTemplates::from_mapping(mapping, &config)?;
            templates.insert(mapping.name.clone(), built);
        }
        debug!(types = templates.len(), "feature provider ready");
        Ok(Self {
            config,
            templates,
            client,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Templates of a feature type.
    pub fn templates(&self, feature_type: &str) -> Result<&QueryTemplates> {
        self.templates
            .get(feature_type)
            .ok_or_else(|| Error::Config(format!("unknown feature type '{}'", feature_type)))
    }

    /// Read features as a lazy event stream.
    ///
    /// Execution failures while planning the read degrade to an empty
    /// result, except for identifier lookups, which report
    /// [`Error::NotFound`]. Failures while rows are streamed end the stream
    /// with an error.
    pub fn stream(&self, query: &FeatureQuery) -> Result<FeatureStream<'_>> {
        let templates = self.templates(&query.feature_type)?;
        let opened = self.open_stream(templates, query).and_then(|mut stream| {
            if let Some(id) = &query.id {
                if !stream.prime_feature()? {
                    return Err(Error::NotFound(id.clone()));
                }
            }
            Ok(stream)
        });
        match opened {
            Ok(stream) => Ok(stream),
            Err(e) => self.degrade(query, e).map(FeatureStream::empty),
        }
    }

    /// Read features and collect the whole event stream.
    ///
    /// Follows the failure policy of [`FeatureProvider::stream`]; a failure
    /// while rows are streamed degrades the same way.
    pub fn read(&self, query: &FeatureQuery) -> Result<Vec<FeatureEvent>> {
        match self.stream(query)?.collect::<Result<Vec<_>>>() {
            Ok(events) => Ok(events),
            Err(e) => self.degrade(query, e).map(|start| vec![start, FeatureEvent::End]),
        }
    }

    /// Map a read failure to its degraded start event or to the error
    /// the caller sees.
    fn degrade(&self, query: &FeatureQuery, error: Error) -> Result<FeatureEvent> {
        match (error, &query.id) {
            (Error::Execution(e), Some(id)) => {
                warn!(feature_type = %query.feature_type, id = %id, error = %e, "identifier lookup failed");
                Err(Error::NotFound(id.clone()))
            }
            (Error::Execution(e), None) => {
                error!(feature_type = %query.feature_type, error = %e, "read failed, returning empty result");
                Ok(FeatureEvent::Start {
                    number_returned: 0,
                    number_matched: self.config.compute_number_matched.then_some(0),
                    single_feature: false,
                })
            }
            (e, _) => Err(e),
        }
    }

    fn open_stream<'s>(&'s self, templates: &QueryTemplates, query: &FeatureQuery) -> Result<FeatureStream<'s>> {
        let filter = query.effective_filter();
        let single = query.returns_single_feature();
        let window = QueryWindow::new(self.config.effective_limit(query.limit), query.offset)
            .with_sort_keys(&query.sort_keys)
            .with_filter(filter.as_ref())
            .with_id_lookup(single);

        let meta_sql = templates.meta_query(&window)?;
        let meta_row = self.client.query(&meta_sql)?.next().transpose()?;
        let meta = match meta_row {
            Some(row) => PageMeta::from_row(&row)?,
            None => return Err(Error::Internal("meta query returned no row".to_string())),
        };
        debug!(
            feature_type = %query.feature_type,
            number_returned = meta.number_returned,
            number_matched = ?meta.number_matched,
            "page metadata"
        );

        if meta.number_returned == 0 {
            if let Some(id) = &query.id {
                return Err(Error::NotFound(id.clone()));
            }
        }

        let start = FeatureEvent::Start {
            number_returned: meta.number_returned,
            number_matched: meta.number_matched,
            single_feature: single,
        };
        let descending: Vec<bool> = query.sort_keys.iter().map(|k| k.is_descending()).collect();
        let reconstructor = FeatureReconstructor::new(templates, &descending)?;
        if meta.number_returned == 0 {
            return Ok(FeatureStream::new(start, None, reconstructor));
        }

        let window = match (&meta.min_key, &meta.max_key) {
            (Some(min), Some(max)) => window.with_key_range(min, max),
            _ => window,
        };
        let mut sources = Vec::new();
        for (sql, layout) in templates
            .value_queries(&window)?
            .iter()
            .zip(reconstructor.layouts())
        {
            sources.push((layout, self.client.query(sql)?));
        }
        Ok(FeatureStream::new(start, Some(RowMerger::new(sources)), reconstructor))
    }

    /// Compile the statements of a feature write without running them.
    pub fn compile_mutation(
        &self,
        feature_type: &str,
        kind: &MutationKind,
        ops: &[ValueOp],
    ) -> Result<Vec<Statement>> {
        let templates = self.templates(feature_type)?;
        let root = templates.root();
        let mut values = ValueContainer::new(root);
        values.apply(ops)?;
        MutationCompiler::new(root, templates.dialect())
            .with_srid(self.config.native_srid)
            .compile(kind, &values)
    }

    /// Create, replace or delete one feature. Returns the feature id.
    ///
    /// Constraint and parse failures of the store surface as
    /// [`Error::Validation`], other store failures as [`Error::Internal`].
    pub fn write(&self, feature_type: &str, kind: &MutationKind, ops: &[ValueOp]) -> Result<Option<String>> {
        let statements = self.compile_mutation(feature_type, kind, ops)?;
        MutationRunner::run(&self.client, &statements).map_err(|e| match e {
            Error::Execution(e) if e.is_user_facing() => {
                warn!(feature_type = %feature_type, error = %e, "write rejected");
                Error::Validation(e.message)
            }
            Error::Execution(e) => {
                error!(feature_type = %feature_type, error = %e, "write failed");
                Error::Internal(e.to_string())
            }
            other => other,
        })
    }

    /// Stage and insert a new feature.
    pub fn create(&self, feature_type: &str, ops: &[ValueOp]) -> Result<Option<String>> {
        self.write(feature_type, &MutationKind::Create, ops)
    }

    /// Replace a feature under its existing id.
    pub fn update(&self, feature_type: &str, id: &str, ops: &[ValueOp]) -> Result<Option<String>> {
        self.write(feature_type, &MutationKind::Update { id: id.to_string() }, ops)
    }

    /// Delete a feature.
    pub fn delete(&self, feature_type: &str, id: &str) -> Result<Option<String>> {
        self.write(feature_type, &MutationKind::Delete { id: id.to_string() }, &[])
    }
}
