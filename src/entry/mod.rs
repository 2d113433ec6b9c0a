//! Поток записей об изменениях: кадрирование, писатели и читатели.

pub mod codec;
pub mod data;
pub mod reader;
pub mod replay;
pub mod writer;

pub use codec::{FieldIndex, IndexFlags, RelationBitmap};
pub use data::{EntryData, EntryDataReader, EntryDataWriter};
pub use reader::{BinaryEntryReader, EntryReader};
pub use replay::{read_all, read_entry, replay, DecodedEntry};
pub use writer::{BinaryEntryWriter, EntryWriter};
