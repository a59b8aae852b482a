//! EntryPoint (v0.6) smart contract interface

mod entry_point;
mod error;
pub mod gen;

pub use entry_point::{EntryPoint, SimulateValidationResult};
pub use error::{decode_revert_error, decode_revert_string, EntityFault, EntryPointError};
pub use gen::{
    entry_point_api, AccountDeployedFilter, EntryPointAPI, EntryPointAPIErrors,
    EntryPointAPIEvents, FailedOp, SignatureAggregatorChangedFilter, UserOperationEventFilter,
};
