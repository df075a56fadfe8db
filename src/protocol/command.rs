use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::Result;

/// Decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Fetch the audio at `audio` and play it.
    Play { audio: Url },

    /// Valid JSON that carries no command this device understands.
    Unrecognized,
}

/// Payload under the `data` key, selected by its `type`.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Data {
    Play {
        audio: Url,
    },
    #[serde(other)]
    Other,
}

impl Command {
    /// Decodes the text of an inbound frame.
    ///
    /// Only a JSON object whose `data` member is itself an object is looked
    /// at; arrays are never read as commands, at either level.
    ///
    /// # Errors
    ///
    /// Fails only when `text` is not JSON at all. JSON of any other shape,
    /// including a `play` command without a usable `audio` URL, decodes to
    /// [`Command::Unrecognized`].
    pub fn decode(text: &str) -> Result<Self> {
        let message: Value = serde_json::from_str(text)?;

        let Some(data) = message
            .as_object()
            .and_then(|fields| fields.get("data"))
            .filter(|data| data.is_object())
        else {
            return Ok(Self::Unrecognized);
        };

        match Data::deserialize(data) {
            Ok(Data::Play { audio }) => Ok(Self::Play { audio }),
            Ok(Data::Other) => Ok(Self::Unrecognized),
            Err(e) => {
                debug!("unrecognized command shape: {e}");
                Ok(Self::Unrecognized)
            }
        }
    }
}
