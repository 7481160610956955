// Copyright 2018 The Cord Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Serde impls: a rope serializes as its text.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::rope::Rope;

impl Serialize for Rope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // `collect_str` drives the rope's Display impl, which writes one
        // chunk at a time; no contiguous copy of the text is built here
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TextVisitor;

        impl<'de> Visitor<'de> for TextVisitor {
            type Value = Rope;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a utf-8 string")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Rope, E> {
                // any utf-8 string is a valid rope
                Ok(Rope::from(s))
            }
        }

        deserializer.deserialize_str(TextVisitor)
    }
}

#[cfg(test)]
mod tests {
    use crate::Rope;
    use serde_test::{assert_tokens, Token};

    #[test]
    fn rope_tokens() {
        let rope = Rope::from("hello world");
        assert_tokens(&rope, &[Token::Str("hello world")]);
    }

    #[test]
    fn json_round_trip() {
        let original = Rope::from("a\nb\u{00A1}\u{4E00}e\u{0301}\u{1F4A9}");
        let json = serde_json::to_string(&original).unwrap();
        let restored: Rope = serde_json::from_str(&json).unwrap();
        assert_eq!(original, restored);
        restored.assert_invariants();
    }
}
