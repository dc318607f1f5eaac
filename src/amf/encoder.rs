use crate::amf::amf0::{markers, AmfValue};
use crate::{ByteQueue, Error, Result};

/// Appends AMF0 values to a [`ByteQueue`].
pub struct AmfWriter<'q> {
    queue: &'q mut ByteQueue,
}

impl<'q> AmfWriter<'q> {
    pub fn new(queue: &'q mut ByteQueue) -> Self {
        AmfWriter { queue }
    }

    pub fn add_string(&mut self, value: &str) -> Result<()> {
        write_string(self.queue, value.as_bytes())
    }

    /// Object/array key: length-prefixed bytes with no type marker
    pub fn add_key_string(&mut self, key: &str) -> Result<()> {
        write_key(self.queue, key.as_bytes())
    }

    pub fn add_bool(&mut self, value: bool) -> Result<()> {
        self.queue.put_u8(markers::BOOLEAN)?;
        self.queue.put_u8(value as u8)
    }

    pub fn add_number(&mut self, value: f64) -> Result<()> {
        self.queue.put_u8(markers::NUMBER)?;
        self.queue.put_f64_be(value)
    }

    pub fn add_null(&mut self) -> Result<()> {
        self.queue.put_u8(markers::NULL)
    }

    pub fn add_undefined(&mut self) -> Result<()> {
        self.queue.put_u8(markers::UNDEFINED)
    }

    /// Write an object; `build` adds its pairs, the end marker follows
    pub fn add_obj<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectBuilder<'_>) -> Result<()>,
    {
        write_obj(self.queue, build)
    }

    /// Write a strict array; the element count is patched once `build` returns
    pub fn add_array<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&mut ArrayBuilder<'_>) -> Result<()>,
    {
        write_array(self.queue, build)
    }

    /// Write an ECMA (associative) array, as used by onMetaData
    pub fn add_ecma_array<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectBuilder<'_>) -> Result<()>,
    {
        write_ecma_array(self.queue, build)
    }

    /// Encode an arbitrary value tree
    pub fn add_value(&mut self, value: &AmfValue<'_>) -> Result<()> {
        write_value(self.queue, value)
    }
}

/// Adds key/value pairs inside an object or ECMA array
pub struct ObjectBuilder<'q> {
    queue: &'q mut ByteQueue,
    count: u32,
}

impl ObjectBuilder<'_> {
    pub fn add_key_value(&mut self, key: &str, value: &AmfValue<'_>) -> Result<()> {
        self.key(key)?;
        write_value(self.queue, value)
    }

    pub fn add_key_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.key(key)?;
        write_string(self.queue, value.as_bytes())
    }

    pub fn add_key_number(&mut self, key: &str, value: f64) -> Result<()> {
        self.key(key)?;
        self.queue.put_u8(markers::NUMBER)?;
        self.queue.put_f64_be(value)
    }

    pub fn add_key_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.key(key)?;
        self.queue.put_u8(markers::BOOLEAN)?;
        self.queue.put_u8(value as u8)
    }

    pub fn add_key_null(&mut self, key: &str) -> Result<()> {
        self.key(key)?;
        self.queue.put_u8(markers::NULL)
    }

    pub fn add_key_obj<F>(&mut self, key: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectBuilder<'_>) -> Result<()>,
    {
        self.key(key)?;
        write_obj(self.queue, build)
    }

    pub fn add_key_array<F>(&mut self, key: &str, build: F) -> Result<()>
    where
        F: FnOnce(&mut ArrayBuilder<'_>) -> Result<()>,
    {
        self.key(key)?;
        write_array(self.queue, build)
    }

    fn key(&mut self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_arg("empty object key collides with end marker"));
        }
        self.count += 1;
        write_key(self.queue, key.as_bytes())
    }
}

/// Adds items inside a strict array
pub struct ArrayBuilder<'q> {
    queue: &'q mut ByteQueue,
    count: u32,
}

impl ArrayBuilder<'_> {
    pub fn add_item(&mut self, value: &AmfValue<'_>) -> Result<()> {
        self.count += 1;
        write_value(self.queue, value)
    }

    pub fn add_string(&mut self, value: &str) -> Result<()> {
        self.count += 1;
        write_string(self.queue, value.as_bytes())
    }

    pub fn add_number(&mut self, value: f64) -> Result<()> {
        self.add_item(&AmfValue::Num(value))
    }

    pub fn add_bool(&mut self, value: bool) -> Result<()> {
        self.add_item(&AmfValue::Bool(value))
    }

    pub fn add_null(&mut self) -> Result<()> {
        self.add_item(&AmfValue::Null)
    }

    pub fn add_obj<F>(&mut self, build: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectBuilder<'_>) -> Result<()>,
    {
        self.count += 1;
        write_obj(self.queue, build)
    }
}

/// Encode a sequence of top-level values into a fresh buffer
pub fn encode_values(values: &[AmfValue<'_>]) -> Result<Vec<u8>> {
    let mut queue = ByteQueue::with_capacity(256);
    for value in values {
        write_value(&mut queue, value)?;
    }
    Ok(queue.take_all())
}

fn write_key(queue: &mut ByteQueue, key: &[u8]) -> Result<()> {
    let len = u16::try_from(key.len())
        .map_err(|_| Error::invalid_arg(format!("AMF key of {} bytes is too long", key.len())))?;
    queue.put_u16_be(len)?;
    queue.put_bytes(key)
}

fn write_string(queue: &mut ByteQueue, value: &[u8]) -> Result<()> {
    match u16::try_from(value.len()) {
        Ok(len) => {
            queue.put_u8(markers::STRING)?;
            queue.put_u16_be(len)?;
        }
        Err(_) => {
            let len = u32::try_from(value.len())
                .map_err(|_| Error::invalid_arg("AMF string exceeds 4 GiB"))?;
            queue.put_u8(markers::LONG_STRING)?;
            queue.put_u32_be(len)?;
        }
    }
    queue.put_bytes(value)
}

fn write_object_end(queue: &mut ByteQueue) -> Result<()> {
    queue.put_u16_be(0)?;
    queue.put_u8(markers::OBJECT_END)
}

fn write_obj<F>(queue: &mut ByteQueue, build: F) -> Result<()>
where
    F: FnOnce(&mut ObjectBuilder<'_>) -> Result<()>,
{
    queue.put_u8(markers::OBJECT)?;
    let mut builder = ObjectBuilder { queue: &mut *queue, count: 0 };
    build(&mut builder)?;
    write_object_end(queue)
}

fn write_ecma_array<F>(queue: &mut ByteQueue, build: F) -> Result<()>
where
    F: FnOnce(&mut ObjectBuilder<'_>) -> Result<()>,
{
    queue.put_u8(markers::ECMA_ARRAY)?;
    let count_at = queue.size();
    queue.put_u32_be(0)?;
    let mut builder = ObjectBuilder { queue: &mut *queue, count: 0 };
    build(&mut builder)?;
    let count = builder.count;
    queue.patch_u32_be(count_at, count)?;
    write_object_end(queue)
}

fn write_array<F>(queue: &mut ByteQueue, build: F) -> Result<()>
where
    F: FnOnce(&mut ArrayBuilder<'_>) -> Result<()>,
{
    queue.put_u8(markers::STRICT_ARRAY)?;
    let count_at = queue.size();
    queue.put_u32_be(0)?;
    let mut builder = ArrayBuilder { queue: &mut *queue, count: 0 };
    build(&mut builder)?;
    let count = builder.count;
    queue.patch_u32_be(count_at, count)
}

fn write_pairs(builder: &mut ObjectBuilder<'_>, pairs: &[(&[u8], AmfValue<'_>)]) -> Result<()> {
    for (key, value) in pairs {
        if key.is_empty() {
            return Err(Error::invalid_arg("empty object key collides with end marker"));
        }
        builder.count += 1;
        write_key(builder.queue, key)?;
        write_value(builder.queue, value)?;
    }
    Ok(())
}

fn write_value(queue: &mut ByteQueue, value: &AmfValue<'_>) -> Result<()> {
    match value {
        AmfValue::Undefined => queue.put_u8(markers::UNDEFINED),
        AmfValue::Null => queue.put_u8(markers::NULL),
        AmfValue::Num(n) => {
            queue.put_u8(markers::NUMBER)?;
            queue.put_f64_be(*n)
        }
        AmfValue::Bool(b) => {
            queue.put_u8(markers::BOOLEAN)?;
            queue.put_u8(*b as u8)
        }
        AmfValue::Str(s) => write_string(queue, s),
        AmfValue::Array(items) => write_array(queue, |arr| {
            for item in items {
                arr.add_item(item)?;
            }
            Ok(())
        }),
        AmfValue::Object(pairs) => write_obj(queue, |obj| write_pairs(obj, pairs)),
        AmfValue::EcmaArray(pairs) => write_ecma_array(queue, |obj| write_pairs(obj, pairs)),
    }
}
