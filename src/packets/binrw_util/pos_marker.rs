use std::{fmt::Debug, io::SeekFrom};

use binrw::{BinRead, BinResult, BinWrite, Endian};

/// A field that records its own stream position.
///
/// When reading, the wrapped value is read as usual and the position it was
/// read from is remembered. When writing, a default value is emitted as a
/// placeholder and the position is remembered, so the real value (an offset
/// or a size that is only known later) can be patched in via
/// [`PosMarker::write_back`] or one of the `write_*` writer functions.
pub struct PosMarker<T> {
    pub pos: core::cell::Cell<u64>,
    pub value: T,
}

impl<T> PosMarker<T>
where
    T: Into<u64> + Copy,
{
    /// Treats the wrapped value as an offset relative to this field's own
    /// location, and returns a [`SeekFrom`] pointing at the target. A zero
    /// offset yields a no-op seek, matching the 0-terminator convention of
    /// chained structures.
    pub fn seek_relative(&self, zero_is_nop: bool) -> SeekFrom {
        debug_assert!(self.pos.get() != u64::MAX);
        if zero_is_nop && Into::<u64>::into(self.value) == 0 {
            SeekFrom::Current(0)
        } else {
            SeekFrom::Start(self.pos.get() + self.value.into())
        }
    }
}

impl<T> BinRead for PosMarker<T>
where
    T: BinRead,
{
    type Args<'a> = T::Args<'a>;

    fn read_options<R: binrw::io::Read + binrw::io::Seek>(
        reader: &mut R,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        T::read_options(reader, endian, args).map(|value| Self {
            pos: core::cell::Cell::new(pos),
            value,
        })
    }
}

impl<T> BinWrite for PosMarker<T>
where
    T: BinWrite<Args<'static> = ()> + Default,
{
    type Args<'a> = ();

    fn write_options<W: binrw::io::Write + binrw::io::Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        args: Self::Args<'_>,
    ) -> BinResult<()> {
        self.pos.set(writer.stream_position()?);
        T::default().write_options(writer, endian, args)
    }
}

impl<T> PosMarker<T>
where
    T: BinWrite<Args<'static> = ()> + TryFrom<u64>,
    T::Error: binrw::error::CustomError + 'static,
{
    /// Seek back to this marker's recorded position, overwrite the
    /// placeholder with `value`, and restore the stream position.
    pub fn write_back<V, W>(&self, value: V, writer: &mut W, endian: Endian) -> BinResult<()>
    where
        V: TryInto<T>,
        W: binrw::io::Write + binrw::io::Seek,
    {
        let return_to = writer.stream_position()?;
        writer.seek(SeekFrom::Start(self.pos.get()))?;
        value
            .try_into()
            .map_err(|_| binrw::error::Error::Custom {
                pos: self.pos.get(),
                err: Box::new("value does not fit in marker field"),
            })?
            .write_options(writer, endian, ())?;
        writer.seek(SeekFrom::Start(return_to))?;
        Ok(())
    }

    /// Writer for a value that fills its absolute start offset into
    /// `write_offset_to`.
    #[binrw::writer(writer, endian)]
    pub fn write_aoff<U>(value: &U, write_offset_to: &Self) -> BinResult<()>
    where
        U: BinWrite<Args<'static> = ()>,
    {
        let start_offset = writer.stream_position()?;
        write_offset_to.write_back(start_offset, writer, endian)?;
        value.write_options(writer, endian, ())
    }

    /// Writer for a value that fills its written size, in bytes, into
    /// `write_size_to`.
    #[binrw::writer(writer, endian)]
    pub fn write_size<U>(value: &U, write_size_to: &Self) -> BinResult<()>
    where
        U: BinWrite<Args<'static> = ()>,
    {
        let start_offset = writer.stream_position()?;
        value.write_options(writer, endian, ())?;
        let size = writer.stream_position()? - start_offset;
        write_size_to.write_back(size, writer, endian)
    }

    /// Writer for a value that fills both its absolute start offset and its
    /// written size.
    #[binrw::writer(writer, endian)]
    pub fn write_aoff_size<U, S>(
        value: &U,
        write_offset_to: &PosMarker<S>,
        write_size_to: &Self,
    ) -> BinResult<()>
    where
        U: BinWrite<Args<'static> = ()>,
        S: BinWrite<Args<'static> = ()> + TryFrom<u64>,
        S::Error: binrw::error::CustomError + 'static,
    {
        let start_offset = writer.stream_position()?;
        write_offset_to.write_back(start_offset, writer, endian)?;
        value.write_options(writer, endian, ())?;
        let size = writer.stream_position()? - start_offset;
        write_size_to.write_back(size, writer, endian)
    }
}

impl<T> Debug for PosMarker<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosMarker")
            .field("pos", &self.pos)
            .field("value", &self.value)
            .finish()
    }
}

impl<T> Default for PosMarker<T>
where
    T: Default,
{
    fn default() -> Self {
        Self {
            pos: core::cell::Cell::new(u64::MAX),
            value: T::default(),
        }
    }
}
