//! 테이블 컨텍스트 레지스트리
//!
//! TABLE_MAP 이벤트로 받은 테이블 정의를 table id 별로 보관한다.
//! 파일 하나를 파싱하는 세션이 단독으로 소유하며 파일 간에 공유하지 않는다.

use crate::events::ColumnType;
use crate::read_ext::bit_is_set;
use std::collections::HashMap;
use tracing::debug;

/// TABLE_MAP 이벤트로 선언된 테이블 정의
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub table_id: u64,
    pub schema: String,
    pub table: String,
    /// 컬럼 타입 (선언 순서)
    pub column_types: Vec<ColumnType>,
    /// 컬럼별 타입 메타데이터 (길이, 정밀도, fsp 등)
    pub column_meta: Vec<u16>,
    /// nullable 비트맵
    pub null_bitmap: Vec<u8>,
    /// optional metadata 의 SIGNEDNESS 블록에서 얻은 unsigned 여부
    pub unsigned: Vec<bool>,
}

impl TableDefinition {
    pub fn column_count(&self) -> usize {
        self.column_types.len()
    }

    pub fn is_nullable(&self, column: usize) -> bool {
        bit_is_set(&self.null_bitmap, column)
    }

    pub fn is_unsigned(&self, column: usize) -> bool {
        self.unsigned.get(column).copied().unwrap_or(false)
    }
}

/// table id → 가장 최근 테이블 정의
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: HashMap<u64, TableDefinition>,
}

impl TableRegistry {
    pub fn new() -> Self {
        TableRegistry::default()
    }

    /// 같은 id 의 이전 정의를 대체한다
    pub fn upsert(&mut self, definition: TableDefinition) -> Option<TableDefinition> {
        debug!(
            "Table map: id={} {}.{} ({} columns)",
            definition.table_id,
            definition.schema,
            definition.table,
            definition.column_count()
        );
        self.tables.insert(definition.table_id, definition)
    }

    pub fn get(&self, table_id: u64) -> Option<&TableDefinition> {
        self.tables.get(&table_id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
