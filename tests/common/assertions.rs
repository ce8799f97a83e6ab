/*
 * Copyright 2019-2021 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use spectral::{AssertionFailure, Spec};
use std::fmt::Debug;

/// An assertion which checks if a `ddreplay::Result` has the correct error variant.
pub trait ErrorVariantAssertions {
    fn is_err_variant(&self, expected_value: ddreplay::Error);
}

impl<'a, T> ErrorVariantAssertions for Spec<'a, ddreplay::Result<T>>
where
    T: Debug,
{
    fn is_err_variant(&self, expected_value: ddreplay::Error) {
        match self.subject {
            Ok(ref value) => {
                AssertionFailure::from_spec(self)
                    .with_expected(format!("Err({:?})", expected_value))
                    .with_actual(format!("Ok({:?})", value))
                    .fail();
            }

            Err(ref error) => {
                if std::mem::discriminant(error) != std::mem::discriminant(&expected_value) {
                    AssertionFailure::from_spec(self)
                        .with_expected(format!("Err({:?})", &expected_value))
                        .with_actual(format!("Err({:?})", error))
                        .fail();
                }
            }
        }
    }
}

/// Assertions which check the details of the conflict or corruption a `ddreplay::Result` failed
/// with.
pub trait ErrorDetailAssertions {
    /// Check that the error is exactly `Error::Conflict(expected_value)`.
    fn is_conflict(&self, expected_value: ddreplay::Conflict);

    /// Check that the error is exactly `Error::Corrupt(expected_value)`, fields included.
    fn is_corruption(&self, expected_value: ddreplay::Corruption);
}

fn fail_with<T: Debug>(spec: &Spec<'_, ddreplay::Result<T>>, expected: String) {
    let actual = match spec.subject {
        Ok(ref value) => format!("Ok({:?})", value),
        Err(ref error) => format!("Err({:?})", error),
    };
    AssertionFailure::from_spec(spec)
        .with_expected(expected)
        .with_actual(actual)
        .fail();
}

impl<'a, T> ErrorDetailAssertions for Spec<'a, ddreplay::Result<T>>
where
    T: Debug,
{
    fn is_conflict(&self, expected_value: ddreplay::Conflict) {
        match self.subject {
            Err(ddreplay::Error::Conflict(ref conflict)) if *conflict == expected_value => {}
            _ => fail_with(self, format!("Err(Conflict({:?}))", expected_value)),
        }
    }

    fn is_corruption(&self, expected_value: ddreplay::Corruption) {
        match self.subject {
            Err(ddreplay::Error::Corrupt(ref corruption)) if *corruption == expected_value => {}
            _ => fail_with(self, format!("Err(Corrupt({:?}))", expected_value)),
        }
    }
}
