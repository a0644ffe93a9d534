//! External chunks: sorted runs stored on file system.

use std::error::Error;
use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;

use log;
use tempfile;

use crate::buffer::DEFAULT_BATCH_SIZE;
use crate::source::BatchSource;

/// External chunk error.
#[derive(Debug)]
pub enum ExternalChunkError<S: Error> {
    /// Common I/O error.
    IO(io::Error),
    /// Data serialization error.
    SerializationError(S),
}

impl<S: Error + 'static> Error for ExternalChunkError<S> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            ExternalChunkError::IO(err) => err,
            ExternalChunkError::SerializationError(err) => err,
        })
    }
}

impl<S: Error> Display for ExternalChunkError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ExternalChunkError::IO(err) => write!(f, "I/O operation failed: {}", err),
            ExternalChunkError::SerializationError(err) => write!(f, "data serialization error: {}", err),
        }
    }
}

impl<S: Error> From<io::Error> for ExternalChunkError<S> {
    fn from(err: io::Error) -> Self {
        ExternalChunkError::IO(err)
    }
}

/// External chunk interface. Provides methods for creating a chunk stored on file system and reading data from it
/// as a batch source. Chunk items are read back in the order they were dumped, so they should be dumped sorted
/// for the chunk to be merged.
/// Data deserialization errors are returned by [`BatchSource::pull`].
pub trait ExternalChunk<T>: Sized + BatchSource<Item = T> {
    /// Error returned when data serialization failed.
    type SerializationError: Error;

    /// Builds an instance of an external chunk.
    ///
    /// # Arguments
    /// * `dir` - Directory the chunk file is created in
    /// * `items` - Chunk items, sorted
    /// * `buf_size` - Chunk file read/write buffer size
    /// * `batch_size` - Number of items decoded per pull
    fn build(
        dir: &tempfile::TempDir,
        items: impl IntoIterator<Item = T>,
        buf_size: Option<usize>,
        batch_size: Option<usize>,
    ) -> Result<Self, ExternalChunkError<Self::SerializationError>> {
        let tmp_file = tempfile::tempfile_in(dir)?;

        let mut chunk_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufWriter::new(tmp_file.try_clone()?),
        };

        Self::dump(&mut chunk_writer, items).map_err(ExternalChunkError::SerializationError)?;

        chunk_writer.flush()?;

        let mut chunk_reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, tmp_file.try_clone()?),
            None => io::BufReader::new(tmp_file.try_clone()?),
        };

        chunk_reader.rewind()?;
        let file_len = tmp_file.metadata()?.len();

        log::debug!("external chunk saved ({} bytes)", file_len);

        return Ok(Self::new(chunk_reader.take(file_len), batch_size.unwrap_or(DEFAULT_BATCH_SIZE)));
    }

    /// Creates and instance of an external chunk.
    fn new(reader: io::Take<io::BufReader<fs::File>>, batch_size: usize) -> Self;

    /// Dumps items to an external file.
    fn dump(
        chunk_writer: &mut io::BufWriter<fs::File>,
        items: impl IntoIterator<Item = T>,
    ) -> Result<(), Self::SerializationError>;
}

/// RMP (Rust MessagePack) external chunk implementation.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpExternalChunk<T> {
    // dropped on release, which closes the file
    reader: Option<io::Take<io::BufReader<fs::File>>>,
    batch_size: usize,
    // decoding error met after some items of a batch, reported on the next pull
    pending: Option<rmp_serde::decode::Error>,

    item_type: PhantomData<T>,
}

impl<T> ExternalChunk<T> for RmpExternalChunk<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type SerializationError = rmp_serde::encode::Error;

    fn new(reader: io::Take<io::BufReader<fs::File>>, batch_size: usize) -> Self {
        RmpExternalChunk {
            reader: Some(reader),
            batch_size: batch_size.max(1),
            pending: None,
            item_type: PhantomData,
        }
    }

    fn dump(
        mut chunk_writer: &mut io::BufWriter<fs::File>,
        items: impl IntoIterator<Item = T>,
    ) -> Result<(), Self::SerializationError> {
        for item in items.into_iter() {
            rmp_serde::encode::write(&mut chunk_writer, &item)?;
        }

        return Ok(());
    }
}

impl<T> BatchSource for RmpExternalChunk<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type Item = T;
    type Error = rmp_serde::decode::Error;

    fn pull(&mut self, batch: &mut Vec<T>) -> Option<Result<(), Self::Error>> {
        let reader = self.reader.as_mut()?;
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        if reader.limit() == 0 {
            return None;
        }

        let start = batch.len();
        while batch.len() - start < self.batch_size && reader.limit() > 0 {
            match rmp_serde::decode::from_read(&mut *reader) {
                Ok(item) => batch.push(item),
                Err(err) if batch.len() == start => return Some(Err(err)),
                Err(err) => {
                    self.pending = Some(err);
                    break;
                }
            }
        }

        return Some(Ok(()));
    }

    fn release(&mut self) {
        self.reader = None;
        self.pending = None;
    }
}
