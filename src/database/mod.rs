mod executor;

pub use executor::{
    database_names, function_names, run_query, split_statements, table_columns, table_names,
    view_columns, view_names, ExecuteError, RunOutcome, SqlExecutor, StatementResult,
};
