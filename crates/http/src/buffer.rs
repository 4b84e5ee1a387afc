/// Read scratch space with a consumed-front offset, so that head
/// parsing can hand leftover bytes to the body reader without a copy.
#[derive(Debug, Default)]
pub struct Buffer {
    offset: usize,
    bytes: Vec<u8>,
}

impl From<Buffer> for Vec<u8> {
    fn from(mut buffer: Buffer) -> Self {
        buffer.bytes.copy_within(buffer.offset.., 0);
        buffer.bytes.truncate(buffer.bytes.len() - buffer.offset);
        buffer.bytes
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { offset: 0, bytes }
    }
}

impl std::ops::Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[self.offset..]
    }
}

impl std::ops::DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes[self.offset..]
    }
}

impl Buffer {
    /// construct an empty buffer with the provided capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            offset: 0,
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// drop all but the first `n` unconsumed bytes
    pub fn truncate(&mut self, n: usize) {
        if n == 0 {
            self.offset = 0;
            self.bytes.truncate(0);
        } else {
            self.bytes.truncate(self.offset + n);
        }
    }

    /// append bytes to the end of the buffer
    pub fn extend_from_slice(&mut self, slice: &[u8]) {
        self.bytes.extend_from_slice(slice);
    }

    /// mark the first `n` unconsumed bytes as consumed
    pub fn ignore_front(&mut self, n: usize) {
        self.offset += n;
        if self.offset >= self.bytes.len() {
            self.bytes.truncate(0);
            self.offset = 0;
        }
    }

    /// the number of unconsumed bytes
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// whether there are no unconsumed bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == self.offset
    }

    /// grow the buffer, zero-filling any spare capacity so it can be
    /// used as a read destination
    pub fn expand(&mut self) {
        let len = self.bytes.len();
        self.bytes.resize(len.max(self.bytes.capacity()).max(len + 100), 0);
    }

    /// take the unconsumed bytes, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(self).into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ignore_front_consumes() {
        let mut buffer = Buffer::from(b"hello world".to_vec());
        buffer.ignore_front(6);
        assert_eq!(&*buffer, b"world");
        assert_eq!(buffer.len(), 5);
        buffer.ignore_front(5);
        assert!(buffer.is_empty());
    }

    #[test]
    fn into_vec_discards_consumed_front() {
        let mut buffer = Buffer::from(b"head:body".to_vec());
        buffer.ignore_front(5);
        let vec: Vec<u8> = buffer.into();
        assert_eq!(vec, b"body");
    }

    #[test]
    fn expand_makes_read_room() {
        let mut buffer = Buffer::default();
        buffer.expand();
        assert!(buffer.len() >= 100);
    }
}
