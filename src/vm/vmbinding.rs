use crate::util::constants::BYTES_IN_WORD;
use crate::vm::ObjectModel;
use crate::vm::Scanning;

/// The `VMBinding` trait associates with each trait, and provides VM-specific constants.
pub trait VMBinding
where
    Self: Sized + 'static + Send + Sync + Default,
{
    type VMObjectModel: ObjectModel<Self>;
    type VMScanning: Scanning<Self>;

    /// Allowed minimal alignment of an object. Every allocation request is rounded up to
    /// a multiple of this.
    const MIN_ALIGNMENT: usize = BYTES_IN_WORD;
}
