//! The resource directory: a tree of type, name and language levels.
//!
//! All offsets inside the tree are relative to the start of the resource directory. The data
//! entries at the leaves point at the resource bytes by RVA.

use super::RvaMap;
use super::payloads::{self, ResourcePayload};
use crate::DirectoryEntry;
use crate::error::{LocalError, LocalResult};
use crate::view::Cursor;
use imgdump_coff::{
    IMAGE_RESOURCE_DATA_ENTRY, IMAGE_RESOURCE_DIRECTORY, IMAGE_RESOURCE_DIRECTORY_ENTRY,
    resource_type_name,
};
use std::fmt;

/// Type, name and language. Anything deeper is not a valid resource tree.
const MAX_DEPTH: u32 = 3;

/// One level of the resource tree.
#[derive(Clone, Debug)]
pub struct ResourceDirectory {
    #[allow(missing_docs)]
    pub characteristics: u32,
    #[allow(missing_docs)]
    pub time_date_stamp: u32,
    #[allow(missing_docs)]
    pub version: (u16, u16),
    /// Named entries first, then entries with integer ids, as stored.
    pub entries: Vec<ResourceEntry>,
}

/// An entry of a resource directory.
#[derive(Clone, Debug)]
pub struct ResourceEntry {
    #[allow(missing_docs)]
    pub id: LocalResult<ResourceId>,
    #[allow(missing_docs)]
    pub node: LocalResult<ResourceNode>,
}

/// The name of a resource directory entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourceId {
    /// A name stored as UTF-16.
    Name(String),
    #[allow(missing_docs)]
    Id(u16),
}

impl ResourceId {
    /// Formats the id as a resource type, so that `3` reads as `ICON`.
    pub fn type_name(&self) -> String {
        match self {
            Self::Id(id) => match resource_type_name(*id) {
                Some(name) => name.to_string(),
                None => id.to_string(),
            },
            Self::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name:?}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// What a directory entry points at.
#[derive(Clone, Debug)]
pub enum ResourceNode {
    #[allow(missing_docs)]
    Directory(ResourceDirectory),
    #[allow(missing_docs)]
    Data(ResourceData),
}

/// A leaf of the resource tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceData {
    #[allow(missing_docs)]
    pub rva: u32,
    #[allow(missing_docs)]
    pub size: u32,
    #[allow(missing_docs)]
    pub code_page: u32,
    /// The decoded contents, for the resource types that have a known layout.
    pub payload: Option<LocalResult<ResourcePayload>>,
}

pub(crate) fn decode(map: &RvaMap<'_>, d: DirectoryEntry) -> LocalResult<ResourceDirectory> {
    let root = map.cursor(d.offset, d.length, "resource directory")?;
    Tree { map, root }.read_directory(0, 0, [None; 2])
}

/// The resource section being walked.
struct Tree<'m, 'a> {
    map: &'m RvaMap<'a>,
    root: Cursor<'a>,
}

impl Tree<'_, '_> {
    /// Reads the directory at `offset` within the tree. `ids` holds the integer ids of the type
    /// and name levels above it, as far as they are known.
    fn read_directory(
        &self,
        offset: u32,
        depth: u32,
        ids: [Option<u16>; 2],
    ) -> LocalResult<ResourceDirectory> {
        let mut c = self.root.at(offset as usize)?;
        let dir: &IMAGE_RESOURCE_DIRECTORY = c.get()?;

        let count =
            dir.number_of_named_entries.get() as usize + dir.number_of_id_entries.get() as usize;
        let raw_entries: &[IMAGE_RESOURCE_DIRECTORY_ENTRY] = c
            .slice(count)
            .map_err(|_| LocalError::overrun("resource directory entries"))?;

        let mut entries = Vec::with_capacity(count);
        for e in raw_entries {
            let id = if e.name_is_string() {
                self.read_name(e.name_offset_or_id())
            } else {
                Ok(ResourceId::Id(e.name_offset_or_id() as u16))
            };

            let mut ids = ids;
            if let (Some(slot), Ok(ResourceId::Id(n))) = (ids.get_mut(depth as usize), &id) {
                *slot = Some(*n);
            }

            let node = if e.data_is_directory() {
                if depth + 1 >= MAX_DEPTH {
                    Err(LocalError::invalid("resource tree is too deep"))
                } else {
                    self.read_directory(e.offset(), depth + 1, ids)
                        .map(ResourceNode::Directory)
                }
            } else {
                self.read_data(e.offset(), ids).map(ResourceNode::Data)
            };

            if let Err(err) = &node {
                tracing::warn!("resource entry: {err}");
            }

            entries.push(ResourceEntry { id, node });
        }

        Ok(ResourceDirectory {
            characteristics: dir.characteristics.get(),
            time_date_stamp: dir.time_date_stamp.get(),
            version: (dir.major_version.get(), dir.minor_version.get()),
            entries,
        })
    }

    /// Reads an `IMAGE_RESOURCE_DIR_STRING_U`: a length in code units, then the UTF-16 text.
    fn read_name(&self, offset: u32) -> LocalResult<ResourceId> {
        let mut c = self.root.at(offset as usize)?;
        let len = c.u16()?;
        let name = c.utf16(len as usize)?;
        Ok(ResourceId::Name(name.to_string_lossy()))
    }

    fn read_data(&self, offset: u32, ids: [Option<u16>; 2]) -> LocalResult<ResourceData> {
        let mut c = self.root.at(offset as usize)?;
        let data: &IMAGE_RESOURCE_DATA_ENTRY = c.get()?;
        let (rva, size) = (data.offset_to_data.get(), data.size.get());
        let payload = payloads::decode(self.map, rva, size, ids[0], ids[1]);
        if let Some(Err(err)) = &payload {
            tracing::warn!("resource data at rva {rva:#x}: {err}");
        }
        Ok(ResourceData {
            rva,
            size,
            code_page: data.code_page.get(),
            payload,
        })
    }
}
