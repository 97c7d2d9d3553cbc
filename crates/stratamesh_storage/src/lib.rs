//! Part metadata, entity tables, buckets, and field storage for stratamesh.
//!
//! This crate provides:
//! - [`MetaData`] - Parts, supersets, induction, fields, and restrictions
//! - [`EntityTable`] - Dense per-offset entity arrays with a recycling free list
//! - [`EntityRepository`] - `EntityKey -> Entity` lookup
//! - [`FieldDataManager`] - Raw per-bucket field allocations
//! - [`BucketRepository`] - Fixed-capacity buckets grouped by part signature
//! - [`ConnectivityMap`] - Which rank pairs store relations

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod connectivity;
pub mod entity;
pub mod field;
pub mod meta;
pub mod repository;

pub use bucket::{Bucket, BucketId, BucketRepository, Partition, PartSignature, Relocation};
pub use connectivity::{ConnectivityMap, ConnectivityType, SlotConnectivity};
pub use entity::{AuxTables, EntityTable, MeshIndex};
pub use field::{FieldDataManager, FieldLayout, FieldLayoutSource, FieldMetaData};
pub use meta::{FieldMeta, FieldRestriction, MetaData, Part};
pub use repository::EntityRepository;
