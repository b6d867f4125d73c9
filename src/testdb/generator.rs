//! Object tree generators for mock devices
//!
//! Builds regular trees whose size is known up front, for completeness and
//! stress checks.

use crate::device::traits::DEVICE_OBJECT_ID;
use crate::testdb::mock_device::{MockFileSystem, MockObject};

/// Tree of folders `depth` levels deep with `fanout` children each; the last
/// level is files
///
/// Holds `fanout + fanout^2 + ... + fanout^depth` objects below the root.
pub fn balanced_tree(depth: usize, fanout: usize) -> MockFileSystem {
    let mut fs = MockFileSystem::new();
    let mut level = vec![DEVICE_OBJECT_ID.to_string()];

    for d in 1..=depth {
        let mut next = Vec::with_capacity(level.len() * fanout);
        for parent in &level {
            for i in 0..fanout {
                let id = if parent == DEVICE_OBJECT_ID {
                    format!("o{}", i)
                } else {
                    format!("{}.{}", parent, i)
                };
                let object = if d == depth {
                    MockObject::file(&id, parent, &format!("IMG_{}.JPG", id), 1024)
                } else {
                    MockObject::folder(&id, parent, &format!("F{}", id))
                };
                fs.add_object(object);
                next.push(id);
            }
        }
        level = next;
    }

    fs
}

/// Single chain of nested folders `depth` levels deep
pub fn deep_chain(depth: usize) -> MockFileSystem {
    let mut fs = MockFileSystem::new();
    let mut parent = DEVICE_OBJECT_ID.to_string();

    for d in 0..depth {
        let id = format!("level{}", d);
        fs.add_object(MockObject::folder(&id, &parent, &format!("L{}", d)));
        parent = id;
    }

    fs
}

/// Number of objects below the root of `balanced_tree(depth, fanout)`
pub fn balanced_tree_size(depth: usize, fanout: usize) -> usize {
    (1..=depth).map(|d| fanout.pow(d as u32)).sum()
}
