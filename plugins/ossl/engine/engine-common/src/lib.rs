// Copyright (C) Microsoft Corporation. All rights reserved.

//! Pieces shared between the engine core and its host adapters.

pub mod handle_table;

pub use crate::handle_table::Handle;
pub use crate::handle_table::HandleTable;
