#![doc = "bintray-sync-core: core passes for provisioning and publishing packages."]

//! This crate holds the domain model and every pass of a bintray-sync run. It never
//! talks HTTP itself: all remote calls go through the [`contract::PackageService`] trait.
//!
//! # Usage
//! Build a [`manifest::Manifest`], pick a service implementation and call
//! [`synchronise::synchronise`], or run a single pass ([`reconcile::reconcile`],
//! [`cleanup::cleanup`], [`publish::publish`]).

pub mod cleanup;
pub mod config;
pub mod context;
pub mod contract;
pub mod manifest;
pub mod publish;
pub mod reconcile;
pub mod synchronise;
