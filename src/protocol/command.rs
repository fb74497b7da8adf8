//! Request builder for RESP commands.

use bytes::{BufMut, Bytes, BytesMut};

use super::CRLF;

/// A command ready to be serialized and written to the socket.
///
/// On the wire a command is an array of bulk strings: the command name
/// followed by each argument.
///
/// # Examples
///
/// ```
/// use crucible::protocol::Command;
///
/// let bytes = Command::new("LPUSH").arg("jobs").arg(b"{}").into_bytes();
/// assert_eq!(&bytes[..], b"*3\r\n$5\r\nLPUSH\r\n$4\r\njobs\r\n$2\r\n{}\r\n");
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    name: &'static str,
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a command with no arguments.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    /// Appends a binary-safe argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Returns the command name, used for error reporting.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Serializes the command into a `BytesMut` buffer.
    pub fn into_bytes(self) -> BytesMut {
        let args_size: usize = self.args.iter().map(|a| a.len() + 16).sum();
        let estimated_size = 16 + self.name.len() + args_size;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("*{}\r\n", self.args.len() + 1).as_bytes());
        put_bulk(&mut buf, self.name.as_bytes());
        for arg in &self.args {
            put_bulk(&mut buf, arg);
        }

        buf
    }
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put(format!("${}\r\n", data.len()).as_bytes());
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Value;

    #[test]
    fn zero_argument_command() {
        let bytes = Command::new("PING").into_bytes();
        assert_eq!(&bytes[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn blocking_pop_command() {
        let bytes = Command::new("BRPOP").arg("alchemy:tasks").arg("0").into_bytes();
        assert_eq!(
            &bytes[..],
            b"*3\r\n$5\r\nBRPOP\r\n$13\r\nalchemy:tasks\r\n$1\r\n0\r\n"
        );
    }

    #[test]
    fn encoded_command_decodes_as_bulk_array() {
        let bytes = Command::new("LPUSH").arg("q").arg(b"a\r\nb").into_bytes();
        let (value, _) = Value::parse(&bytes).unwrap();
        assert_eq!(
            value,
            Value::Array(Some(vec![
                Value::bulk("LPUSH"),
                Value::bulk("q"),
                Value::bulk(b"a\r\nb"),
            ]))
        );
    }

    #[test]
    fn name_is_preserved() {
        assert_eq!(Command::new("BRPOP").name(), "BRPOP");
    }
}
