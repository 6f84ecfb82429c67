/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`     - Interactive chat against a running server
- `sessions` - List and delete stored sessions
- `serve` is handled by [`crate::server::serve`]

`special_commands` parses the `/` commands understood inside `chat`.
*/

pub mod chat;
pub mod sessions;
pub mod special_commands;
