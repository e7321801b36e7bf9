use std::fmt;
use std::sync::Arc;

use crate::encoding::Value;
use crate::errors::DbError;
use crate::query::Projection;

use super::{IdIterator, ValueIterator};

/// Presents each document of its source through a projection. Ids and
/// iteration are the source's.
pub struct ProjectIterator<'a> {
    source: Box<dyn ValueIterator + 'a>,
    projection: Arc<Projection>,
}

impl<'a> ProjectIterator<'a> {
    #[must_use]
    pub fn new(source: Box<dyn ValueIterator + 'a>, projection: Arc<Projection>) -> Self {
        Self { source, projection }
    }
}

impl IdIterator for ProjectIterator<'_> {
    fn advance(&mut self) -> bool {
        self.source.advance()
    }

    fn id(&self) -> &[u8] {
        self.source.id()
    }

    fn err(&self) -> Option<&DbError> {
        self.source.err()
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.source.close()
    }
}

impl ValueIterator for ProjectIterator<'_> {
    fn with_value(
        &mut self,
        f: &mut dyn FnMut(&Value) -> Result<(), DbError>,
    ) -> Result<(), DbError> {
        let projection = &self.projection;
        self.source.with_value(&mut |doc| f(&projection.apply(doc)))
    }
}

impl fmt::Display for ProjectIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PROJECT({}, {})", self.source, self.projection)
    }
}
