//! Driver for "enumerate N items" native calls.
//!
//! The native side is called twice with the same request structure: first
//! with a null data pointer so it reports the item count, then with a
//! buffer of that many elements to fill. When the count grows between the
//! two calls the native side reports [`QueryStatus::Incomplete`] and the
//! sequence starts over.

use std::fmt;
use std::sync::Arc;

use super::{
    ComputedLayout, FieldKind, MarshalError, NativeFrame, PointerKind, Scalar, ScopedArena,
    StructMarshaller, StructValue, Value,
};
use crate::logging::{debug, warn};

/// Restarts allowed before [`TwoCallQuery::run`] gives up.
pub const MAX_QUERY_ATTEMPTS: usize = 16;

/// Where a [`TwoCallQuery`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    /// Next call passes a null data pointer and reads back the count.
    SizeQuery,
    /// The count is known; element storage is not yet allocated.
    Allocate,
    /// Next call passes the allocated elements to be filled.
    DataQuery,
    Done,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SizeQuery => "SIZE_QUERY",
            Self::Allocate => "ALLOCATE",
            Self::DataQuery => "DATA_QUERY",
            Self::Done => "DONE",
        })
    }
}

/// Result reported by the native side of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Complete,
    /// More items exist than the buffer could hold.
    Incomplete,
}

/// Two-call query state machine over a request record.
///
/// The request layout must contain an optional array pointer (the data
/// field) that names its count field. Both fields stay independently
/// settable, so the same request is reused for both calls.
#[derive(Debug)]
pub struct TwoCallQuery<'m> {
    marshaller: &'m StructMarshaller,
    layout: Arc<ComputedLayout>,
    request: StructValue,
    data_field: Arc<str>,
    count_field: Arc<str>,
    count_scalar: Scalar,
    element: FieldKind,
    state: QueryState,
    arena: ScopedArena,
    attempts: usize,
}

impl<'m> TwoCallQuery<'m> {
    pub fn new(
        marshaller: &'m StructMarshaller,
        layout: Arc<ComputedLayout>,
        request: StructValue,
        data_field: &str,
    ) -> Result<Self, MarshalError> {
        let data = layout.field(data_field).ok_or_else(|| MarshalError::UnknownField {
            name: layout.name().to_string(),
            field: data_field.to_string(),
        })?;
        let FieldKind::Pointer(PointerKind::Array {
            element,
            count_field,
        }) = data.kind()
        else {
            return Err(MarshalError::InvalidQuery(format!(
                "'{}' is not an array pointer",
                data_field
            )));
        };
        if !data.is_optional() {
            return Err(MarshalError::InvalidQuery(format!(
                "'{}' must be optional to be null during the size query",
                data_field
            )));
        }
        let count_scalar = match layout.field(count_field).map(|f| f.kind()) {
            Some(FieldKind::Scalar(scalar)) => *scalar,
            _ => return Err(MarshalError::UnresolvedType(count_field.to_string())),
        };

        Ok(Self {
            marshaller,
            data_field: Arc::from(data_field),
            count_field: count_field.clone(),
            element: (**element).clone(),
            count_scalar,
            layout,
            request,
            state: QueryState::SizeQuery,
            arena: ScopedArena::new(),
            attempts: 0,
        })
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn request(&self) -> &StructValue {
        &self.request
    }

    /// The count currently held by the request.
    pub fn count(&self) -> usize {
        self.request
            .get(&self.count_field)
            .and_then(Value::as_count)
            .unwrap_or(0)
    }

    pub fn set_count(&mut self, count: usize) -> Result<(), MarshalError> {
        let value = count_value(self.count_scalar, count).ok_or_else(|| {
            MarshalError::TypeMismatch {
                field: self.count_field.to_string(),
                expected: self.count_scalar.c_name().to_string(),
                got: count.to_string(),
            }
        })?;
        self.request.set(self.count_field.clone(), value);
        Ok(())
    }

    pub fn set_data(&mut self, value: impl Into<Value>) {
        self.request.set(self.data_field.clone(), value);
    }

    fn expect_state(&self, expected: QueryState) -> Result<(), MarshalError> {
        if self.state != expected {
            return Err(MarshalError::InvalidQuery(format!(
                "expected state {}, query is in {}",
                expected, self.state
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: QueryState) {
        debug!(
            name = self.layout.name(),
            from = %self.state,
            to = %next,
            count = self.count(),
            "two-call query transition"
        );
        self.state = next;
    }

    /// Encode the request, let `native` see it, and decode what it left.
    fn issue<F>(&mut self, native: &mut F) -> Result<QueryStatus, MarshalError>
    where
        F: FnMut(QueryState, &mut NativeFrame<'_>) -> anyhow::Result<QueryStatus>,
    {
        let mut buffer = self
            .marshaller
            .encode(&self.request, &self.layout, &mut self.arena)?;
        let status = native(self.state, &mut NativeFrame::new(&mut buffer, &mut self.arena))
            .map_err(MarshalError::NativeCall)?;
        self.request = self
            .marshaller
            .decode(&buffer, &self.layout, 0, &self.arena)?;
        Ok(status)
    }

    /// First call: null data pointer, native reports the count.
    pub fn size_query<F>(&mut self, mut native: F) -> Result<usize, MarshalError>
    where
        F: FnMut(QueryState, &mut NativeFrame<'_>) -> anyhow::Result<QueryStatus>,
    {
        self.expect_state(QueryState::SizeQuery)?;
        self.arena.clear();
        self.set_data(Value::Null);
        self.set_count(0)?;
        self.issue(&mut native)?;
        self.transition(QueryState::Allocate);
        Ok(self.count())
    }

    /// Provide zeroed storage for the reported number of elements.
    pub fn allocate(&mut self) -> Result<(), MarshalError> {
        self.expect_state(QueryState::Allocate)?;
        let items = (0..self.count())
            .map(|_| self.element.default_value())
            .collect::<Vec<_>>();
        self.set_data(Value::Array(items));
        self.transition(QueryState::DataQuery);
        Ok(())
    }

    /// Second call: native fills the elements.
    ///
    /// On [`QueryStatus::Incomplete`] the query returns to
    /// [`QueryState::SizeQuery`].
    pub fn data_query<F>(&mut self, mut native: F) -> Result<QueryStatus, MarshalError>
    where
        F: FnMut(QueryState, &mut NativeFrame<'_>) -> anyhow::Result<QueryStatus>,
    {
        self.expect_state(QueryState::DataQuery)?;
        let status = self.issue(&mut native)?;
        match status {
            QueryStatus::Complete => self.transition(QueryState::Done),
            QueryStatus::Incomplete => {
                warn!(name = self.layout.name(), "count grew between calls, restarting");
                self.transition(QueryState::SizeQuery);
            }
        }
        Ok(status)
    }

    /// The decoded elements of a finished query.
    pub fn into_items(mut self) -> Result<Vec<Value>, MarshalError> {
        self.expect_state(QueryState::Done)?;
        match self.request.get_mut(&self.data_field).map(|v| std::mem::replace(v, Value::Null)) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(MarshalError::TypeMismatch {
                field: self.data_field.to_string(),
                expected: "array".to_string(),
                got: other.kind_name().to_string(),
            }),
        }
    }

    /// Drive the whole sequence with one native entry point.
    ///
    /// `native` receives the current state so a single closure can serve
    /// both calls.
    pub fn run<F>(mut self, mut native: F) -> Result<Vec<Value>, MarshalError>
    where
        F: FnMut(QueryState, &mut NativeFrame<'_>) -> anyhow::Result<QueryStatus>,
    {
        loop {
            self.attempts += 1;
            if self.attempts > MAX_QUERY_ATTEMPTS {
                return Err(MarshalError::InvalidQuery(format!(
                    "'{}' still incomplete after {} attempts",
                    self.layout.name(),
                    MAX_QUERY_ATTEMPTS
                )));
            }
            if self.size_query(&mut native)? == 0 {
                self.transition(QueryState::Done);
                return Ok(Vec::new());
            }
            self.allocate()?;
            if self.data_query(&mut native)? == QueryStatus::Complete {
                return self.into_items();
            }
        }
    }
}

fn count_value(scalar: Scalar, count: usize) -> Option<Value> {
    Some(match scalar {
        Scalar::U8 => Value::U8(u8::try_from(count).ok()?),
        Scalar::U16 => Value::U16(u16::try_from(count).ok()?),
        Scalar::U32 => Value::U32(u32::try_from(count).ok()?),
        Scalar::U64 => Value::U64(u64::try_from(count).ok()?),
        Scalar::Usize => Value::Usize(count),
        _ => return None,
    })
}
