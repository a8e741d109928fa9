pub mod http {
    pub mod error;
    pub mod json_stream;
    pub mod source;
}

pub mod sql {
    pub mod base {
        pub mod error;
    }

    pub mod postgres {
        pub mod adapter;
        pub mod binary;
        pub mod encoder;
        pub mod query;
        pub mod utils;
    }
}
