// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Contains ARM specific objects and routines

pub mod ap;
pub mod dp;
pub mod map;
pub mod register;
