use crossbeam_channel::Sender;
use kiln_base::{AssetPath, LoadHandle};
use kiln_pipeline::{AssetTypeId, SingleObject, Value};
use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

/// Operations on a loaded object's reference count, applied by the loader on its next tick
#[derive(Debug)]
pub enum RefOp {
    Decrease(LoadHandle),
    Increase(LoadHandle),
}

/// A fully loaded asset. Immutable once the loader publishes it.
#[derive(Debug)]
pub struct AssetObject {
    path: AssetPath,
    load_handle: LoadHandle,
    object: SingleObject,
}

impl AssetObject {
    pub(crate) fn new(
        path: AssetPath,
        load_handle: LoadHandle,
        object: SingleObject,
    ) -> Self {
        AssetObject {
            path,
            load_handle,
            object,
        }
    }

    pub fn path(&self) -> &AssetPath {
        &self.path
    }

    pub fn load_handle(&self) -> LoadHandle {
        self.load_handle
    }

    pub fn type_id(&self) -> AssetTypeId {
        self.object.type_id()
    }

    pub fn type_name(&self) -> &str {
        self.object.schema().name()
    }

    pub fn object(&self) -> &SingleObject {
        &self.object
    }

    pub fn get(
        &self,
        field_name: &str,
    ) -> Option<&Value> {
        self.object.get(field_name)
    }
}

/// A counted reference to a loaded asset. The object stays registered, and its teardown is held
/// off, while any handle to it is alive. Clones share the same object.
pub struct AssetHandle {
    object: Arc<AssetObject>,
    ref_tx: Sender<RefOp>,
}

impl AssetHandle {
    // The loader has already counted the reference this handle represents
    pub(crate) fn new_counted(
        object: Arc<AssetObject>,
        ref_tx: Sender<RefOp>,
    ) -> Self {
        AssetHandle { object, ref_tx }
    }

    pub fn load_handle(&self) -> LoadHandle {
        self.object.load_handle
    }

    /// True if both handles refer to the same loaded object, not just the same path
    pub fn ptr_eq(
        a: &AssetHandle,
        b: &AssetHandle,
    ) -> bool {
        Arc::ptr_eq(&a.object, &b.object)
    }
}

impl Deref for AssetHandle {
    type Target = AssetObject;

    fn deref(&self) -> &AssetObject {
        &self.object
    }
}

impl Clone for AssetHandle {
    fn clone(&self) -> Self {
        let _ = self.ref_tx.send(RefOp::Increase(self.object.load_handle));
        AssetHandle {
            object: self.object.clone(),
            ref_tx: self.ref_tx.clone(),
        }
    }
}

impl Drop for AssetHandle {
    fn drop(&mut self) {
        // The loader may already be gone, in which case there is nothing left to release
        let _ = self.ref_tx.send(RefOp::Decrease(self.object.load_handle));
    }
}

impl Debug for AssetHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AssetHandle")
            .field("path", &self.object.path)
            .field("load_handle", &self.object.load_handle)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kiln_pipeline::SchemaSetBuilder;

    #[test]
    fn clone_and_drop_send_ref_ops() {
        let mut builder = SchemaSetBuilder::default();
        builder
            .register_record_type("Texture", |x| {
                x.add_u32("width");
            })
            .unwrap();
        let schema_set = builder.build().unwrap();
        let record = schema_set.find_record_by_name("Texture").unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let object = Arc::new(AssetObject::new(
            AssetPath::parse("/Textures/Grass").unwrap(),
            LoadHandle(7),
            SingleObject::new(record),
        ));

        let handle = AssetHandle::new_counted(object, tx);
        assert!(rx.try_recv().is_err());

        let cloned = handle.clone();
        assert!(AssetHandle::ptr_eq(&handle, &cloned));
        assert!(matches!(rx.try_recv(), Ok(RefOp::Increase(LoadHandle(7)))));

        drop(handle);
        drop(cloned);
        assert!(matches!(rx.try_recv(), Ok(RefOp::Decrease(LoadHandle(7)))));
        assert!(matches!(rx.try_recv(), Ok(RefOp::Decrease(LoadHandle(7)))));
        assert!(rx.try_recv().is_err());
    }
}
