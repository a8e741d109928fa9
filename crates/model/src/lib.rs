pub mod records {
    pub mod batch;
    pub mod record;
}

pub mod pagination {
    pub mod cursor;
}

pub mod execution {
    pub mod errors;
    pub mod strategy;
}
