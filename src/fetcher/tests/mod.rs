use super::*;
use crate::fetcher::test_helpers::{FakeFactory, config_for};
use std::time::Duration;
