//! Instrumented region descriptions.
//!
//! A [`Region`] is what the instrumentation site hands to the enter/exit
//! hooks: the name of the span plus whatever metadata the call site can
//! provide cheaply. The engine decides at enter time which of it to keep,
//! driven by the session configuration.

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RecordScope {
    Function = 0,
    BackwardFunction = 1,
    UserScope = 2,
}

/// Sentinel for "not part of a forward/backward pairing".
pub const NO_SEQUENCE_NUMBER: i64 = -1;

/// A caller-delimited span of execution marked for instrumentation.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    scope: RecordScope,
    is_async: bool,
    sequence_number: i64,
    forward_thread_id: u64,
    input_shapes: Vec<Vec<i64>>,
    input_dtypes: Vec<String>,
    stack: Vec<String>,
}

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: RecordScope::Function,
            is_async: false,
            sequence_number: NO_SEQUENCE_NUMBER,
            forward_thread_id: 0,
            input_shapes: Vec::new(),
            input_dtypes: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: RecordScope) -> Self {
        self.scope = scope;
        self
    }

    /// Mark the region as potentially completing out of order relative to
    /// its caller (exit may happen on a different thread).
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Forward-pass pairing: sequence number plus the thread that owned the
    /// paired forward region.
    pub fn with_sequence(mut self, sequence_number: i64, forward_thread_id: u64) -> Self {
        self.sequence_number = sequence_number;
        self.forward_thread_id = forward_thread_id;
        self
    }

    pub fn with_input_shapes(mut self, shapes: Vec<Vec<i64>>) -> Self {
        self.input_shapes = shapes;
        self
    }

    pub fn with_input_dtypes(mut self, dtypes: Vec<String>) -> Self {
        self.input_dtypes = dtypes;
        self
    }

    /// Call-stack frames captured by the instrumentation site. The engine
    /// copies them only when the session asked for stacks.
    pub fn with_stack(mut self, frames: Vec<String>) -> Self {
        self.stack = frames;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> RecordScope {
        self.scope
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    pub fn forward_thread_id(&self) -> u64 {
        self.forward_thread_id
    }

    pub fn input_shapes(&self) -> &[Vec<i64>] {
        &self.input_shapes
    }

    pub fn input_dtypes(&self) -> &[String] {
        &self.input_dtypes
    }

    pub fn stack(&self) -> &[String] {
        &self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_defaults() {
        let region = Region::new("aten::add");
        assert_eq!(region.name(), "aten::add");
        assert_eq!(region.scope(), RecordScope::Function);
        assert!(!region.is_async());
        assert_eq!(region.sequence_number(), NO_SEQUENCE_NUMBER);
        assert!(region.input_shapes().is_empty());
    }

    #[test]
    fn test_region_builder() {
        let region = Region::new("aten::mm")
            .with_scope(RecordScope::BackwardFunction)
            .with_async(true)
            .with_sequence(7, 42)
            .with_input_shapes(vec![vec![2, 3], vec![3, 4]])
            .with_input_dtypes(vec!["float".into(), "float".into()]);
        assert_eq!(region.scope(), RecordScope::BackwardFunction);
        assert!(region.is_async());
        assert_eq!(region.sequence_number(), 7);
        assert_eq!(region.forward_thread_id(), 42);
        assert_eq!(region.input_shapes().len(), 2);
        assert_eq!(region.input_dtypes().len(), 2);
    }
}
