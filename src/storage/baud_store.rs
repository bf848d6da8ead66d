//! Baud rate record in NOR flash

use crc::{Crc, CRC_16_XMODEM};
use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::config::baud::DEFAULT_BAUD_RATE;
use crate::config::storage::{BAUD_RECORD_OFFSET, BAUD_RECORD_SIZE, SETTINGS_PARTITION_OFFSET};

/// CRC-16 XMODEM over the baud bytes
const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Errors from the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The flash driver reported an error
    Flash(NorFlashErrorKind),
    /// No record has ever been written
    NotFound,
    /// Record present but its checksum does not match
    Corrupted,
}

/// Persistent storage for the UART baud rate
pub trait BaudStore {
    /// Read the stored rate
    fn load(&mut self) -> Result<u32, StorageError>;

    /// Replace the stored rate
    fn save(&mut self, baud: u32) -> Result<(), StorageError>;
}

/// Load the stored rate, falling back to [`DEFAULT_BAUD_RATE`]
///
/// On fallback the default is written back so the next boot finds a valid
/// record. A failing write-back is logged and otherwise ignored.
pub fn load_baud_or_default<S: BaudStore>(store: &mut S) -> u32 {
    match store.load() {
        Ok(baud) => baud,
        Err(e) => {
            log::info!("STORE: no usable baud record ({:?}), using {}", e, DEFAULT_BAUD_RATE);
            if let Err(e) = store.save(DEFAULT_BAUD_RATE) {
                log::warn!("STORE: failed to save default baud rate: {:?}", e);
            }
            DEFAULT_BAUD_RATE
        }
    }
}

/// Baud rate record stored directly in NOR flash
///
/// Layout: `[baud: u32 LE][crc16: u16 LE][0xFF, 0xFF]`. The record owns the
/// flash sector it sits in; saving erases the whole sector.
pub struct FlashBaudStore<F> {
    flash: F,
    offset: u32,
}

impl<F: NorFlash> FlashBaudStore<F> {
    /// Store at the default location in the settings region
    pub fn new(flash: F) -> Self {
        Self::with_offset(flash, SETTINGS_PARTITION_OFFSET + BAUD_RECORD_OFFSET)
    }

    pub fn with_offset(flash: F, offset: u32) -> Self {
        Self { flash, offset }
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    fn encode(baud: u32) -> [u8; BAUD_RECORD_SIZE] {
        let value = baud.to_le_bytes();
        let crc = CRC.checksum(&value).to_le_bytes();
        [value[0], value[1], value[2], value[3], crc[0], crc[1], 0xFF, 0xFF]
    }

    fn decode(record: &[u8; BAUD_RECORD_SIZE]) -> Result<u32, StorageError> {
        if record.iter().all(|&b| b == 0xFF) {
            return Err(StorageError::NotFound);
        }
        let value = [record[0], record[1], record[2], record[3]];
        let crc = u16::from_le_bytes([record[4], record[5]]);
        if CRC.checksum(&value) != crc {
            return Err(StorageError::Corrupted);
        }
        Ok(u32::from_le_bytes(value))
    }

    fn sector_start(&self) -> u32 {
        self.offset - self.offset % F::ERASE_SIZE as u32
    }
}

fn flash_error<E: NorFlashError>(e: E) -> StorageError {
    StorageError::Flash(e.kind())
}

impl<F: NorFlash> BaudStore for FlashBaudStore<F> {
    fn load(&mut self) -> Result<u32, StorageError> {
        let mut record = [0u8; BAUD_RECORD_SIZE];
        self.flash.read(self.offset, &mut record).map_err(flash_error)?;
        Self::decode(&record)
    }

    fn save(&mut self, baud: u32) -> Result<(), StorageError> {
        let sector = self.sector_start();
        self.flash
            .erase(sector, sector + F::ERASE_SIZE as u32)
            .map_err(flash_error)?;
        self.flash
            .write(self.offset, &Self::encode(baud))
            .map_err(flash_error)?;
        log::debug!("STORE: saved baud rate {}", baud);
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    //! Mock storage for testing

    use super::*;
    use embedded_storage::nor_flash::{ErrorType, ReadNorFlash};
    use heapless::Vec;

    pub const MOCK_SECTOR_SIZE: usize = 256;
    pub const MOCK_FLASH_SIZE: usize = 4 * MOCK_SECTOR_SIZE;

    /// RAM-backed NOR flash with real erase/program semantics
    ///
    /// Writes can only clear bits; erase sets a whole sector to 0xFF.
    pub struct MockFlash {
        data: [u8; MOCK_FLASH_SIZE],
        fail_writes: bool,
        erase_count: usize,
    }

    impl MockFlash {
        pub fn new() -> Self {
            Self {
                data: [0xFF; MOCK_FLASH_SIZE],
                fail_writes: false,
                erase_count: 0,
            }
        }

        pub fn set_fail_writes(&mut self, fail: bool) {
            self.fail_writes = fail;
        }

        pub fn erase_count(&self) -> usize {
            self.erase_count
        }

        pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
            &self.data[offset..offset + len]
        }

        /// Overwrite bytes directly, bypassing NOR semantics
        pub fn poke(&mut self, offset: usize, bytes: &[u8]) {
            self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        }

        fn check_range(&self, offset: u32, len: usize) -> Result<(), NorFlashErrorKind> {
            if offset as usize + len > MOCK_FLASH_SIZE {
                return Err(NorFlashErrorKind::OutOfBounds);
            }
            Ok(())
        }
    }

    impl Default for MockFlash {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ErrorType for MockFlash {
        type Error = NorFlashErrorKind;
    }

    impl ReadNorFlash for MockFlash {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            self.check_range(offset, bytes.len())?;
            let start = offset as usize;
            bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
            Ok(())
        }

        fn capacity(&self) -> usize {
            MOCK_FLASH_SIZE
        }
    }

    impl NorFlash for MockFlash {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = MOCK_SECTOR_SIZE;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            if from as usize % MOCK_SECTOR_SIZE != 0 || to as usize % MOCK_SECTOR_SIZE != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            self.check_range(from, (to - from) as usize)?;
            self.data[from as usize..to as usize].fill(0xFF);
            self.erase_count += 1;
            Ok(())
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            if self.fail_writes {
                return Err(NorFlashErrorKind::Other);
            }
            if offset as usize % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            self.check_range(offset, bytes.len())?;
            for (cell, &byte) in self.data[offset as usize..].iter_mut().zip(bytes) {
                *cell &= byte;
            }
            Ok(())
        }
    }

    /// In-memory baud store recording every save
    pub struct MockBaudStore {
        value: Option<u32>,
        saves: Vec<u32, 16>,
        fail_saves: bool,
    }

    impl MockBaudStore {
        pub fn new(value: Option<u32>) -> Self {
            Self {
                value,
                saves: Vec::new(),
                fail_saves: false,
            }
        }

        pub fn set_fail_saves(&mut self, fail: bool) {
            self.fail_saves = fail;
        }

        pub fn value(&self) -> Option<u32> {
            self.value
        }

        pub fn saves(&self) -> &[u32] {
            &self.saves
        }
    }

    impl BaudStore for MockBaudStore {
        fn load(&mut self) -> Result<u32, StorageError> {
            self.value.ok_or(StorageError::NotFound)
        }

        fn save(&mut self, baud: u32) -> Result<(), StorageError> {
            if self.fail_saves {
                return Err(StorageError::Flash(NorFlashErrorKind::Other));
            }
            let _ = self.saves.push(baud);
            self.value = Some(baud);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockBaudStore, MockFlash, MOCK_SECTOR_SIZE};
    use super::*;

    const OFFSET: u32 = MOCK_SECTOR_SIZE as u32 + BAUD_RECORD_OFFSET;

    fn store() -> FlashBaudStore<MockFlash> {
        FlashBaudStore::with_offset(MockFlash::new(), OFFSET)
    }

    #[test]
    fn test_blank_flash_not_found() {
        let mut store = store();
        assert_eq!(store.load(), Err(StorageError::NotFound));
    }

    #[test]
    fn test_save_then_load() {
        let mut store = store();
        store.save(115200).unwrap();
        assert_eq!(store.load(), Ok(115200));

        store.save(9600).unwrap();
        assert_eq!(store.load(), Ok(9600));
    }

    #[test]
    fn test_record_layout() {
        let mut store = store();
        store.save(0x0001_C200).unwrap();
        let flash = store.into_inner();
        let record = flash.bytes(OFFSET as usize, BAUD_RECORD_SIZE);
        assert_eq!(&record[..4], &[0x00, 0xC2, 0x01, 0x00]);
        let crc = CRC.checksum(&record[..4]).to_le_bytes();
        assert_eq!(&record[4..6], &crc);
        assert_eq!(&record[6..], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_save_erases_only_own_sector() {
        let mut flash = MockFlash::new();
        flash.poke(0, &[0x12, 0x34]);
        let mut store = FlashBaudStore::with_offset(flash, OFFSET);
        store.save(57600).unwrap();
        let flash = store.into_inner();
        assert_eq!(flash.erase_count(), 1);
        assert_eq!(flash.bytes(0, 2), &[0x12, 0x34]);
    }

    #[test]
    fn test_corrupted_record() {
        let mut store = store();
        store.save(19200).unwrap();
        let mut flash = store.into_inner();
        flash.poke(OFFSET as usize, &[0x01]);
        let mut store = FlashBaudStore::with_offset(flash, OFFSET);
        assert_eq!(store.load(), Err(StorageError::Corrupted));
    }

    #[test]
    fn test_write_failure_reported() {
        let mut flash = MockFlash::new();
        flash.set_fail_writes(true);
        let mut store = FlashBaudStore::with_offset(flash, OFFSET);
        assert_eq!(
            store.save(9600),
            Err(StorageError::Flash(NorFlashErrorKind::Other))
        );
    }

    #[test]
    fn test_read_out_of_bounds() {
        let mut store = FlashBaudStore::with_offset(MockFlash::new(), 0x10_0000);
        assert_eq!(
            store.load(),
            Err(StorageError::Flash(NorFlashErrorKind::OutOfBounds))
        );
    }

    #[test]
    fn test_load_or_default_uses_stored_value() {
        let mut store = MockBaudStore::new(Some(230400));
        assert_eq!(load_baud_or_default(&mut store), 230400);
        assert!(store.saves().is_empty());
    }

    #[test]
    fn test_load_or_default_writes_back_default() {
        let mut store = MockBaudStore::new(None);
        assert_eq!(load_baud_or_default(&mut store), DEFAULT_BAUD_RATE);
        assert_eq!(store.saves(), &[DEFAULT_BAUD_RATE]);
        assert_eq!(store.value(), Some(DEFAULT_BAUD_RATE));
    }

    #[test]
    fn test_load_or_default_recovers_corrupted_flash() {
        let mut flash = MockFlash::new();
        flash.poke(OFFSET as usize, &[0x00, 0x25, 0x00, 0x00, 0xDE, 0xAD, 0xFF, 0xFF]);
        let mut store = FlashBaudStore::with_offset(flash, OFFSET);
        assert_eq!(load_baud_or_default(&mut store), DEFAULT_BAUD_RATE);
        assert_eq!(store.load(), Ok(DEFAULT_BAUD_RATE));
    }

    #[test]
    fn test_load_or_default_survives_failed_write_back() {
        let mut store = MockBaudStore::new(None);
        store.set_fail_saves(true);
        assert_eq!(load_baud_or_default(&mut store), DEFAULT_BAUD_RATE);
        assert_eq!(store.value(), None);
    }

    #[test]
    fn test_record_sector_inside_settings_partition() {
        use crate::config::storage::SETTINGS_PARTITION_SIZE;
        // ESP32-S3 flash erase granularity
        const FLASH_SECTOR: u32 = 4096;

        let record = SETTINGS_PARTITION_OFFSET + BAUD_RECORD_OFFSET;
        let sector = record - record % FLASH_SECTOR;
        assert_eq!(SETTINGS_PARTITION_OFFSET % FLASH_SECTOR, 0);
        assert!(sector >= SETTINGS_PARTITION_OFFSET);
        assert!(sector + FLASH_SECTOR <= SETTINGS_PARTITION_OFFSET + SETTINGS_PARTITION_SIZE);
        // Clear of the default nvs and phy_init partitions
        assert!(sector >= 0x1_0000);
    }
}
