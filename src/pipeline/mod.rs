//! Reader and writer contracts
//!
//! The broker neither parses nor understands payload bytes: it consumes a
//! reader opened by a caller-supplied factory and feeds writers opened the
//! same way. Optional behaviour (pause, seek, codec change) is modelled as
//! narrow capability traits probed at runtime.

pub mod factory;
pub mod reader;
pub mod writer;

#[cfg(test)]
pub mod testing;

pub use factory::{
    reader_factory, reader_remover, writer_factory, writer_remover, BoxFuture, ReaderFactory,
    ReaderRemover, SharedReader, SharedWriter, WriterFactory, WriterRemover,
};
pub use reader::{PacketReader, Pausable, Seekable};
pub use writer::{CodecChangeWriter, PacketWriter};
