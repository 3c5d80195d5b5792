// SPDX-License-Identifier: MPL-2.0

pub(crate) use alloc::string::String;
pub(crate) use alloc::sync::Arc;
pub(crate) use alloc::vec;
pub(crate) use alloc::vec::Vec;
pub(crate) use core::mem::size_of;

pub(crate) use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

pub(crate) use crate::device::{BlockAccess, DeviceError};
pub(crate) use crate::error::{Error, Result};
