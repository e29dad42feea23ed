//! Analyzer façade: runs the full pipeline for one closure and memoizes the
//! result per (defining class, captured values).

use crate::capture::Captures;
use crate::config::AnalyzerConfig;
use crate::constant_pool::ConstantPool;
use crate::decode::decode;
use crate::expr::Expression;
use crate::flow::{reconstruct, InstructionStream};
use crate::instruction::Instruction;
use crate::intrinsics::IntrinsicRegistry;
use crate::simplify::Simplifier;
use crate::simulate::{Frame, Simulator};
use crate::subject::{SubjectParam, SubjectType};
use crate::types::LiteralValue;
use crate::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Decoded body of a predicate: its instructions and where the subject lives.
#[derive(Debug, Clone)]
pub struct PredicateBody {
    pub instructions: Vec<Instruction>,
    pub subject: SubjectParam,
}

/// A closure handed to the analyzer by an external loader.
pub trait PredicateSource {
    /// Identity of the synthetic class (or method) holding the body.
    fn defining_class(&self) -> &str;

    fn captures(&self) -> &Captures;

    /// Loads the body; may fail when the bytes cannot be decoded.
    fn body(&self, intrinsics: &IntrinsicRegistry) -> Result<PredicateBody>;
}

/// A predicate as raw method-body bytes plus its resolved constant pool.
#[derive(Debug, Clone)]
pub struct RawPredicate {
    pub class: String,
    pub code: Vec<u8>,
    pub pool: ConstantPool,
    pub subject: SubjectParam,
    pub captures: Captures,
}

impl RawPredicate {
    pub fn new(class: impl Into<String>, code: Vec<u8>, pool: ConstantPool, subject: SubjectParam) -> Self {
        Self { class: class.into(), code, pool, subject, captures: Captures::new() }
    }

    pub fn with_captures(mut self, captures: Captures) -> Self {
        self.captures = captures;
        self
    }
}

impl PredicateSource for RawPredicate {
    fn defining_class(&self) -> &str {
        &self.class
    }

    fn captures(&self) -> &Captures {
        &self.captures
    }

    fn body(&self, intrinsics: &IntrinsicRegistry) -> Result<PredicateBody> {
        let instructions = decode(&self.code, &self.pool, intrinsics)?;
        Ok(PredicateBody { instructions, subject: self.subject.clone() })
    }
}

/// A predicate whose body was decoded elsewhere.
#[derive(Debug, Clone)]
pub struct DecodedPredicate {
    pub class: String,
    pub instructions: Vec<Instruction>,
    pub subject: SubjectParam,
    pub captures: Captures,
}

impl DecodedPredicate {
    pub fn new(class: impl Into<String>, instructions: Vec<Instruction>, subject: SubjectParam) -> Self {
        Self { class: class.into(), instructions, subject, captures: Captures::new() }
    }

    pub fn with_captures(mut self, captures: Captures) -> Self {
        self.captures = captures;
        self
    }
}

impl PredicateSource for DecodedPredicate {
    fn defining_class(&self) -> &str {
        &self.class
    }

    fn captures(&self) -> &Captures {
        &self.captures
    }

    fn body(&self, _intrinsics: &IntrinsicRegistry) -> Result<PredicateBody> {
        Ok(PredicateBody { instructions: self.instructions.clone(), subject: self.subject.clone() })
    }
}

/// Canonical expression of an analyzed predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub expression: Expression,
    pub subject_type: SubjectType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

type CacheKey = (String, Vec<LiteralValue>);

/// Entry point of the crate. Cheap to share across threads; the cache is
/// internal to each instance.
#[derive(Debug)]
pub struct Analyzer {
    config: AnalyzerConfig,
    intrinsics: Arc<IntrinsicRegistry>,
    cache: RwLock<HashMap<CacheKey, Arc<AnalysisResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_intrinsics(config, Arc::new(IntrinsicRegistry::with_builtins()))
    }

    pub fn with_intrinsics(config: AnalyzerConfig, intrinsics: Arc<IntrinsicRegistry>) -> Self {
        Self {
            config,
            intrinsics,
            cache: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn intrinsics(&self) -> &IntrinsicRegistry {
        &self.intrinsics
    }

    /// Analyzes `source`, returning the cached result when the same class was
    /// already analyzed with the same captured values. Failures are never cached.
    pub fn analyze(&self, source: &dyn PredicateSource) -> Result<Arc<AnalysisResult>> {
        if !self.config.cache_enabled {
            return self.run_pipeline(source).map(Arc::new);
        }
        let key: CacheKey = (source.defining_class().to_string(), source.captures().values());
        if let Some(hit) = self.read_cache().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("cache hit for {}", key.0);
            return Ok(Arc::clone(hit));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = Arc::new(self.run_pipeline(source)?);

        let mut cache = self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = cache.get(&key) {
            // another thread finished first; keep its entry
            return Ok(Arc::clone(existing));
        }
        if self.config.cache_capacity.is_some_and(|cap| cache.len() >= cap) {
            log::debug!("analysis cache full, not storing {}", key.0);
            return Ok(result);
        }
        cache.insert(key, Arc::clone(&result));
        Ok(result)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.read_cache().len(),
        }
    }

    pub fn clear(&self) {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<CacheKey, Arc<AnalysisResult>>> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_pipeline(&self, source: &dyn PredicateSource) -> Result<AnalysisResult> {
        let class = source.defining_class();
        let body = source.body(&self.intrinsics)?;
        log::debug!("analyzing {} ({} instructions)", class, body.instructions.len());

        let stream = InstructionStream::new(body.instructions)?;
        let simulator = Simulator::new(&self.intrinsics);
        let frame = Frame::initial(body.subject.slot, source.captures())?;
        let value = reconstruct(&stream, &simulator, frame)?.into_bool();
        let raw = value.lower(body.subject.slot)?;
        log::trace!("raw expression for {}: {}", class, raw);

        let expression = Simplifier::new(self.config.max_simplify_passes).simplify(raw)?;
        log::debug!("{} => {}", class, expression);
        Ok(AnalysisResult { expression, subject_type: body.subject.ty })
    }
}
