//! pager manages fixed-size pages of one open database file.
//!
//! The pager owns the file handle and a write-through cache of page images.
//! Callers get owned copies of pages ([`MemPage`]); a mutated page only
//! becomes durable when handed back through [`Pager::write_page`], which
//! updates the cache and the file together.  Pages are numbered from 1, to
//! match how the file format numbers pages.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::dbheader::{DB_HEADER_BYTES, DEFAULT_PAGE_SIZE};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not open database file.")]
    CannotOpen,
    #[error("The page number is higher than the file contains or the code supports.")]
    PageNumberBeyondLimits,
    #[error("Error accessing database file: {0}")]
    Io(#[from] std::io::Error),
    #[error("The file is too short to contain a database header.")]
    NoHeader,
}

pub type PageNum = usize;

// Cap on pages held in memory; at the default page size this is ~10MB.
const MAX_PAGE_NUM: PageNum = 10_000;

/// An owned copy of one page.  `npage` is where the image will be written
/// back; the root-split swap relies on being able to retarget it.
#[derive(Debug, Clone)]
pub struct MemPage {
    pub npage: PageNum,
    pub data: Vec<u8>,
}

/// One pager per open database file.
#[derive(Debug)]
pub struct Pager {
    f: File,
    page_size: usize,
    n_pages: usize,
    pages: Vec<Option<Vec<u8>>>,
}

impl Pager {
    /// Open `path`, creating the file if it does not exist.  The caller is
    /// responsible for installing the real page size (from the file header)
    /// before reading pages; a fresh file starts with the default.
    pub fn open(path: &str) -> Result<Pager, Error> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|_| Error::CannotOpen)?;
        let file_len = f.metadata()?.len() as usize;
        let page_size = DEFAULT_PAGE_SIZE as usize;
        Ok(Pager {
            f,
            page_size,
            n_pages: file_len / page_size,
            pages: vec![],
        })
    }

    /// True if the underlying file holds no data yet.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.f.metadata()?.len() == 0)
    }

    /// Raw first 100 bytes of the file, for header validation.
    pub fn read_header(&mut self) -> Result<[u8; DB_HEADER_BYTES], Error> {
        let mut buf = [0u8; DB_HEADER_BYTES];
        self.f.seek(SeekFrom::Start(0))?;
        self.f.read_exact(&mut buf).map_err(|_| Error::NoHeader)?;
        Ok(buf)
    }

    /// Install the page size read from the file header.  Recomputes the page
    /// count and drops any cached images read under the old size.
    pub fn set_page_size(&mut self, page_size: u32) -> Result<(), Error> {
        self.page_size = page_size as usize;
        let file_len = self.f.metadata()?.len() as usize;
        self.n_pages = file_len / self.page_size;
        self.pages.clear();
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn n_pages(&self) -> usize {
        self.n_pages
    }

    /// Grow the file by one page.  The new page reads back zero-filled until
    /// something is written to it.
    pub fn allocate_page(&mut self) -> Result<PageNum, Error> {
        if self.n_pages + 1 > MAX_PAGE_NUM {
            return Err(Error::PageNumberBeyondLimits);
        }
        self.n_pages += 1;
        let pn = self.n_pages;
        self.ensure_cache_len(pn);
        self.pages[pn - 1] = Some(vec![0u8; self.page_size]);
        Ok(pn)
    }

    /// Read page `pn` as an owned copy.
    pub fn read_page(&mut self, pn: PageNum) -> Result<MemPage, Error> {
        if pn < 1 || pn > self.n_pages || pn > MAX_PAGE_NUM {
            return Err(Error::PageNumberBeyondLimits);
        }
        self.ensure_cache_len(pn);
        if self.pages[pn - 1].is_none() {
            let v = self.read_page_from_file(pn)?;
            self.pages[pn - 1] = Some(v);
        }
        Ok(MemPage {
            npage: pn,
            data: self.pages[pn - 1].as_ref().unwrap().clone(),
        })
    }

    /// Write a page image back to its page number, through the cache.
    pub fn write_page(&mut self, page: &MemPage) -> Result<(), Error> {
        let pn = page.npage;
        if pn < 1 || pn > self.n_pages || pn > MAX_PAGE_NUM {
            return Err(Error::PageNumberBeyondLimits);
        }
        if page.data.len() != self.page_size {
            return Err(Error::PageNumberBeyondLimits);
        }
        self.ensure_cache_len(pn);
        self.pages[pn - 1] = Some(page.data.clone());
        self.f
            .seek(SeekFrom::Start((pn - 1) as u64 * self.page_size as u64))?;
        self.f.write_all(&page.data)?;
        self.f.flush()?;
        Ok(())
    }

    fn ensure_cache_len(&mut self, pn: PageNum) {
        if pn > self.pages.len() {
            self.pages.resize(pn, None);
        }
    }

    fn read_page_from_file(&mut self, pn: PageNum) -> Result<Vec<u8>, Error> {
        let mut v = vec![0u8; self.page_size];
        let offset = (pn - 1) as u64 * self.page_size as u64;
        let file_len = self.f.metadata()?.len();
        if offset >= file_len {
            // Allocated but never written: zero-filled.
            return Ok(v);
        }
        self.f.seek(SeekFrom::Start(offset))?;
        // The last page of a file created under a different tool may be
        // short; read what is there and leave the rest zeroed.
        let available = ((file_len - offset) as usize).min(self.page_size);
        self.f.read_exact(&mut v[..available])?;
        Ok(v)
    }
}
