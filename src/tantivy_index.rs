use std::{path::Path, sync::Mutex};

use serde_json::{Map, Value as JsonValue};
use tantivy::{
    DocAddress,
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    Searcher,
    TantivyDocument,
    Term,
    collector::{Count, TopDocs},
    directory::MmapDirectory,
    query::{AllQuery, BooleanQuery, EmptyQuery, Occur, Query, QueryParser, TermQuery},
    schema::{
        FAST,
        Field,
        INDEXED,
        IndexRecordOption,
        JsonObjectOptions,
        STORED,
        STRING,
        Schema,
        TextFieldIndexing,
        TextOptions,
        Value,
    },
    tokenizer::TokenStream,
};
use tracing::debug;

use crate::{
    analysis::{DEFAULT_ANALYZER, default_analyzer},
    engine::{
        Engine,
        EngineError,
        EngineIndex,
        EngineResult,
        Hit,
        StoredDocument,
        StoredField,
        StoredValue,
    },
    query::{SearchQuery, SearchRequest},
};

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "_id";
    pub const SEQ: &str = "_seq";
    pub const SOURCE: &str = "_source";
    pub const ALL: &str = "_all";
    pub const BODY: &str = "body";
}

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Opens and creates on-disk Tantivy indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct TantivyEngine;

impl Engine for TantivyEngine {
    type Index = TantivyIndex;

    fn open(&self, path: &Path) -> EngineResult<TantivyIndex> {
        let dir = MmapDirectory::open(path)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        TantivyIndex::from_index(Index::open(dir)?)
    }

    fn create(&self, path: &Path) -> EngineResult<TantivyIndex> {
        std::fs::create_dir_all(path)?;
        let dir = MmapDirectory::open(path)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = Index::create(
            dir,
            build_schema(),
            tantivy::IndexSettings::default(),
        )?;
        TantivyIndex::from_index(index)
    }
}

/// Resolved handles for the fields read back at query time.
#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    source: Field,
    all: Field,
}

impl SchemaFields {
    /// Fails on indices that were not created by [`TantivyEngine`].
    fn resolve(schema: &Schema) -> EngineResult<Self> {
        schema.get_field(fields::SEQ)?;
        schema.get_field(fields::BODY)?;
        Ok(Self {
            id: schema.get_field(fields::ID)?,
            source: schema.get_field(fields::SOURCE)?,
            all: schema.get_field(fields::ALL)?,
        })
    }
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(fields::ID, STRING | STORED);
    builder.add_u64_field(fields::SEQ, INDEXED | FAST | STORED);
    builder
        .add_text_field(fields::SOURCE, TextOptions::default().set_stored());

    let indexing = TextFieldIndexing::default()
        .set_tokenizer(DEFAULT_ANALYZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    builder.add_text_field(
        fields::ALL,
        TextOptions::default().set_indexing_options(indexing.clone()),
    );
    builder.add_json_field(
        fields::BODY,
        JsonObjectOptions::default().set_indexing_options(indexing),
    );

    builder.build()
}

struct WriterState {
    writer: IndexWriter,
    next_seq: u64,
}

/// One open Tantivy index.
///
/// Writes are serialized through a single writer and committed
/// immediately; every document carries a sequence number so match-all
/// listings come back in insertion order.
pub struct TantivyIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
    fields: SchemaFields,
    writer: Mutex<Option<WriterState>>,
}

impl TantivyIndex {
    fn from_index(index: Index) -> EngineResult<Self> {
        index
            .tokenizers()
            .register(DEFAULT_ANALYZER, default_analyzer());
        let schema = index.schema();
        let fields = SchemaFields::resolve(&schema)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET)?;

        let next_seq = sequenced(&reader.searcher())?
            .iter()
            .map(|(seq, _)| *seq)
            .max()
            .map_or(0, |max| max + 1);

        Ok(Self {
            index,
            reader,
            schema,
            fields,
            writer: Mutex::new(Some(WriterState { writer, next_seq })),
        })
    }

    fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut WriterState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut guard =
            self.writer.lock().map_err(|_| tantivy::TantivyError::Poisoned)?;
        let state = guard.as_mut().ok_or(EngineError::Closed)?;
        let out = f(state)?;
        // Reload before releasing the writer so the next holder sees every
        // commit made so far.
        self.reader.reload()?;
        drop(guard);
        Ok(out)
    }

    fn find(&self, searcher: &Searcher, id: &str) -> EngineResult<Option<DocAddress>> {
        let term = Term::from_field_text(self.fields.id, id);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        Ok(top.into_iter().next().map(|(_, address)| address))
    }

    fn hit(
        &self,
        searcher: &Searcher,
        address: DocAddress,
        score: f32,
    ) -> EngineResult<Hit> {
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(Hit {
            id: extract_text(&doc, self.fields.id),
            score,
        })
    }

    fn match_all(
        &self,
        searcher: &Searcher,
        from: usize,
        size: usize,
    ) -> EngineResult<Vec<Hit>> {
        let mut ordered = sequenced(searcher)?;
        ordered.sort_unstable_by_key(|(seq, _)| *seq);
        ordered
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(_, address)| self.hit(searcher, address, 1.0))
            .collect()
    }

    fn build_query(&self, query: &SearchQuery) -> EngineResult<Box<dyn Query>> {
        match query {
            SearchQuery::MatchAll { .. } => Ok(Box::new(AllQuery)),
            SearchQuery::QueryString { query } => self.parse(query),
            SearchQuery::Match { text, field } => {
                let tokens = analyze(text);
                if tokens.is_empty() {
                    return Ok(Box::new(EmptyQuery));
                }
                let prefix = field_prefix(field.as_deref())?;
                let clauses: Vec<String> = tokens
                    .iter()
                    .map(|token| format!("{prefix}{}", quote(token)))
                    .collect();
                self.parse(&clauses.join(" OR "))
            }
            SearchQuery::Term { term, field } => {
                let prefix = field_prefix(Some(field))?;
                self.parse(&format!("{prefix}{}", quote(term)))
            }
            SearchQuery::Conjuncts { conjuncts } => {
                self.boolean(Occur::Must, conjuncts)
            }
            SearchQuery::Disjuncts { disjuncts } => {
                self.boolean(Occur::Should, disjuncts)
            }
        }
    }

    fn boolean(
        &self,
        occur: Occur,
        clauses: &[SearchQuery],
    ) -> EngineResult<Box<dyn Query>> {
        let clauses = clauses
            .iter()
            .map(|q| Ok((occur, self.build_query(q)?)))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn parse(&self, query: &str) -> EngineResult<Box<dyn Query>> {
        let parser = QueryParser::for_index(&self.index, vec![self.fields.all]);
        parser
            .parse_query(query)
            .map_err(|e| EngineError::Query(e.to_string()))
    }
}

impl EngineIndex for TantivyIndex {
    fn index(&self, id: &str, body: &Map<String, JsonValue>) -> EngineResult<()> {
        let source = serde_json::to_string(body)?;
        let mut all_text = Vec::new();
        body.values().for_each(|value| collect_text(value, &mut all_text));

        self.with_writer(|state| {
            let mut raw = Map::new();
            raw.insert(fields::ID.to_string(), id.into());
            raw.insert(fields::SEQ.to_string(), state.next_seq.into());
            raw.insert(fields::SOURCE.to_string(), source.into());
            raw.insert(fields::ALL.to_string(), JsonValue::Array(all_text));
            raw.insert(fields::BODY.to_string(), JsonValue::Object(body.clone()));
            let doc = TantivyDocument::parse_json(
                &self.schema,
                &JsonValue::Object(raw).to_string(),
            )
            .map_err(|e| EngineError::InvalidDocument(e.to_string()))?;

            // Replace any existing document with this id.
            state
                .writer
                .delete_term(Term::from_field_text(self.fields.id, id));
            state.writer.add_document(doc)?;
            state.writer.commit()?;
            state.next_seq += 1;
            Ok(())
        })?;

        debug!(id, "indexed document");
        Ok(())
    }

    fn delete(&self, id: &str) -> EngineResult<()> {
        let term = Term::from_field_text(self.fields.id, id);
        let query = TermQuery::new(term.clone(), IndexRecordOption::Basic);

        // The existence check runs under the writer lock so two deletes of
        // one id cannot both pass it.
        self.with_writer(|state| {
            if self.reader.searcher().search(&query, &Count)? == 0 {
                return Err(EngineError::NotFound(id.to_string()));
            }
            state.writer.delete_term(term);
            state.writer.commit()?;
            Ok(())
        })
    }

    fn search(&self, request: &SearchRequest) -> EngineResult<Vec<Hit>> {
        let searcher = self.reader.searcher();
        if request.size == 0 {
            return Ok(Vec::new());
        }
        if request.query.is_match_all() {
            return self.match_all(&searcher, request.from, request.size);
        }

        let query = self.build_query(&request.query)?;
        let limit = request
            .from
            .saturating_add(request.size)
            .min(searcher.num_docs() as usize);
        if limit <= request.from {
            return Ok(Vec::new());
        }

        let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit))?;

        top_docs
            .into_iter()
            .skip(request.from)
            .map(|(score, address)| self.hit(&searcher, address, score))
            .collect()
    }

    fn document(&self, id: &str) -> EngineResult<StoredDocument> {
        let searcher = self.reader.searcher();
        let address = self
            .find(&searcher, id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let doc: TantivyDocument = searcher.doc(address)?;
        let source: Map<String, JsonValue> =
            serde_json::from_str(&extract_text(&doc, self.fields.source))?;

        let mut fields = Vec::new();
        for (name, value) in &source {
            flatten(name, value, &mut fields);
        }

        Ok(StoredDocument {
            id: id.to_string(),
            fields,
        })
    }

    fn doc_count(&self) -> EngineResult<u64> {
        Ok(self.reader.searcher().num_docs())
    }

    fn close(&self) -> EngineResult<()> {
        let state = self
            .writer
            .lock()
            .map_err(|_| tantivy::TantivyError::Poisoned)?
            .take();
        if let Some(state) = state {
            state.writer.wait_merging_threads()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TantivyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyIndex").finish_non_exhaustive()
    }
}

/// Every live document with its sequence number, in segment order.
fn sequenced(searcher: &Searcher) -> EngineResult<Vec<(u64, DocAddress)>> {
    let mut out = Vec::with_capacity(searcher.num_docs() as usize);
    for (ord, segment) in searcher.segment_readers().iter().enumerate() {
        let seqs = segment.fast_fields().u64(fields::SEQ)?;
        for doc in segment.doc_ids_alive() {
            if let Some(seq) = seqs.first(doc) {
                out.push((seq, DocAddress::new(ord as u32, doc)));
            }
        }
    }
    Ok(out)
}

/// Expand a stored JSON value into engine fields: arrays repeat the field
/// name and nested objects extend it with a dot.
fn flatten(name: &str, value: &JsonValue, out: &mut Vec<StoredField>) {
    match value {
        JsonValue::Null => {}
        JsonValue::Bool(b) => {
            out.push(StoredField::new(name, StoredValue::Boolean(*b)));
        }
        JsonValue::Number(n) => {
            out.push(StoredField::new(name, StoredValue::Number(n.clone())));
        }
        JsonValue::String(s) => {
            let value = if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                StoredValue::DateTime(s.clone())
            } else {
                StoredValue::Text(s.clone())
            };
            out.push(StoredField::new(name, value));
        }
        JsonValue::Array(items) => {
            for item in items {
                flatten(name, item, out);
            }
        }
        JsonValue::Object(map) => {
            for (key, nested) in map {
                flatten(&format!("{name}.{key}"), nested, out);
            }
        }
    }
}

fn collect_text(value: &JsonValue, out: &mut Vec<JsonValue>) {
    match value {
        JsonValue::String(s) => out.push(JsonValue::String(s.clone())),
        JsonValue::Array(items) => {
            items.iter().for_each(|item| collect_text(item, out))
        }
        JsonValue::Object(map) => {
            map.values().for_each(|item| collect_text(item, out))
        }
        _ => {}
    }
}

fn analyze(text: &str) -> Vec<String> {
    let mut analyzer = default_analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

/// Query-string prefix addressing a path inside the JSON body, or the
/// catch-all field when no field is given.
fn field_prefix(field: Option<&str>) -> EngineResult<String> {
    let Some(field) = field else {
        return Ok(String::new());
    };
    let valid = field
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid || field.starts_with('.') || field.ends_with('.') {
        return Err(EngineError::Query(format!("unsupported field name {field:?}")));
    }
    Ok(format!("{}.{field}:", fields::BODY))
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
